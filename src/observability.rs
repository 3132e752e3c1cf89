use biometrics::{Collector, Counter, Moments};

pub(crate) static SEND_REQUESTS: Counter = Counter::new("colloquy.send.requests");
pub(crate) static SEND_REJECTED: Counter = Counter::new("colloquy.send.rejected");
pub(crate) static SEND_ERRORS: Counter = Counter::new("colloquy.send.errors");
pub(crate) static SEND_ABORTS: Counter = Counter::new("colloquy.send.aborts");
pub(crate) static SEND_SUPERSEDED: Counter = Counter::new("colloquy.send.superseded");
pub(crate) static SEND_DURATION: Moments = Moments::new("colloquy.send.duration_seconds");

pub(crate) static ATTACHMENTS_ENCODED: Counter = Counter::new("colloquy.attachment.encoded");
pub(crate) static ATTACHMENT_ERRORS: Counter = Counter::new("colloquy.attachment.errors");
pub(crate) static ATTACHMENT_BYTES: Counter = Counter::new("colloquy.attachment.bytes");

pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("colloquy.stream.fragments");
pub(crate) static STREAM_DROPPED: Counter = Counter::new("colloquy.stream.dropped_fragments");
pub(crate) static STREAM_BYTES: Counter = Counter::new("colloquy.stream.bytes");
pub(crate) static STREAM_TTFB: Moments = Moments::new("colloquy.stream.ttfb_seconds");

pub(crate) static PROVIDER_REQUESTS: Counter = Counter::new("colloquy.provider.requests");
pub(crate) static PROVIDER_ERRORS: Counter = Counter::new("colloquy.provider.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&SEND_REQUESTS);
    collector.register_counter(&SEND_REJECTED);
    collector.register_counter(&SEND_ERRORS);
    collector.register_counter(&SEND_ABORTS);
    collector.register_counter(&SEND_SUPERSEDED);
    collector.register_moments(&SEND_DURATION);

    collector.register_counter(&ATTACHMENTS_ENCODED);
    collector.register_counter(&ATTACHMENT_ERRORS);
    collector.register_counter(&ATTACHMENT_BYTES);

    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_DROPPED);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFB);

    collector.register_counter(&PROVIDER_REQUESTS);
    collector.register_counter(&PROVIDER_ERRORS);
}
