use biometrics::{Collector, Counter, Moments};

pub(crate) static BACKEND_REQUESTS: Counter = Counter::new("fireflies.backend.requests");
pub(crate) static BACKEND_REQUEST_ERRORS: Counter =
    Counter::new("fireflies.backend.request_errors");
pub(crate) static BACKEND_REQUEST_DURATION: Moments =
    Moments::new("fireflies.backend.request_duration_seconds");

pub(crate) static STREAM_RECORDS: Counter = Counter::new("fireflies.stream.records");
pub(crate) static STREAM_CHUNKS: Counter = Counter::new("fireflies.stream.chunks");
pub(crate) static STREAM_MALFORMED_LINES: Counter =
    Counter::new("fireflies.stream.malformed_lines");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("fireflies.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("fireflies.stream.bytes");

pub(crate) static GENERATIONS_STARTED: Counter = Counter::new("fireflies.generation.started");
pub(crate) static GENERATIONS_COMPLETED: Counter =
    Counter::new("fireflies.generation.completed");
pub(crate) static GENERATIONS_CANCELLED: Counter =
    Counter::new("fireflies.generation.cancelled");
pub(crate) static GENERATIONS_FAILED: Counter = Counter::new("fireflies.generation.failed");
pub(crate) static GENERATION_DURATION: Moments =
    Moments::new("fireflies.generation.duration_seconds");

pub(crate) static COMMANDS_HANDLED: Counter = Counter::new("fireflies.commands.handled");

pub(crate) static SEARCH_REQUESTS: Counter = Counter::new("fireflies.retrieval.searches");
pub(crate) static SEARCH_FAILURES: Counter = Counter::new("fireflies.retrieval.search_failures");
pub(crate) static FETCH_REQUESTS: Counter = Counter::new("fireflies.retrieval.fetches");
pub(crate) static FETCH_FAILURES: Counter = Counter::new("fireflies.retrieval.fetch_failures");
pub(crate) static FETCH_TIMEOUTS: Counter = Counter::new("fireflies.retrieval.fetch_timeouts");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&BACKEND_REQUESTS);
    collector.register_counter(&BACKEND_REQUEST_ERRORS);
    collector.register_moments(&BACKEND_REQUEST_DURATION);

    collector.register_counter(&STREAM_RECORDS);
    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_MALFORMED_LINES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&GENERATIONS_STARTED);
    collector.register_counter(&GENERATIONS_COMPLETED);
    collector.register_counter(&GENERATIONS_CANCELLED);
    collector.register_counter(&GENERATIONS_FAILED);
    collector.register_moments(&GENERATION_DURATION);

    collector.register_counter(&COMMANDS_HANDLED);

    collector.register_counter(&SEARCH_REQUESTS);
    collector.register_counter(&SEARCH_FAILURES);
    collector.register_counter(&FETCH_REQUESTS);
    collector.register_counter(&FETCH_FAILURES);
    collector.register_counter(&FETCH_TIMEOUTS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_with_a_collector() {
        register_biometrics(Collector::new());
    }
}
