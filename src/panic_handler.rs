use std::panic;

/// Installs `better_panic` and routes panics into the log file before the
/// default report is printed
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        log::error!("Panic on thread '{name}': {panic_info}");
        log::logger().flush();

        default_hook(panic_info);
    }));
}
