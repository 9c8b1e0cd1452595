use slog::Drain;

/// Builds the default terminal logger used by `spice-cli` and by tests that want to see what
/// the client is doing. Library code never constructs this itself; it always takes a
/// `slog::Logger` handed in by the caller.
pub fn terminal_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!("component" => "spice-client"))
}
