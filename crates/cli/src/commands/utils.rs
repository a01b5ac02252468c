pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}

/// Renders a status flag the way the tables expect it.
pub fn status_label(healthy: bool) -> &'static str {
    if healthy {
        "[HEALTHY]"
    } else {
        "[UNHEALTHY]"
    }
}
