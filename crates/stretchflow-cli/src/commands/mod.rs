pub mod config;
pub mod session;
pub mod streak;
pub mod voice;

/// Single-threaded runtime for one command invocation.
pub(crate) fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
