use tracing::span::EnteredSpan;

/// Opens the profiling scope of one public memory call.
///
/// The scope closes when the returned guard drops, so every early return is
/// still timed. Subscribers that record span durations (for example
/// `tracing-subscriber` with `FmtSpan::CLOSE`) see one span per call.
#[must_use = "the scope closes as soon as the guard is dropped"]
pub fn scope(func: &'static str) -> EnteredSpan {
    tracing::info_span!(target: "devmem::profiling", "runtime_api", func).entered()
}
