//! Output formatting and display utilities
//!
//! Colored terminal output for the server's own commands. Runtime logging
//! goes through `tracing`, not through here.

use colored::Colorize;

use warden::WardenConfig;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", msg.bold().underline());
}

/// Print a subheader
pub fn subheader(msg: &str) {
    println!("\n{}", msg.bold());
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {} {}", format!("{label}:").dimmed(), value);
}

/// Print the effective configuration. The signing secret is never shown.
pub fn print_config_summary(config: &WardenConfig, bind: &str, store: &str) {
    header("Warden configuration");

    subheader("Server:");
    row("Bind", bind);
    row("Store", store);

    subheader("Tokens:");
    row("Issuer", &config.token.issuer);
    row("Audience", &config.token.audience);
    row("Lifetime", format!("{:?}", config.token.ttl));
    row("Request header", &config.token.header);
    row("Response header", &config.token.response_header);
    row("Secret", format!("{} characters", config.token.secret.len()));

    subheader("Access:");
    for path in &config.public_paths {
        row("Public", path);
    }

    subheader("Login throttling:");
    row("Max attempts", config.login.max_attempts);
    row("Window", format!("{:?}", config.login.attempt_window));
    row("Tracked usernames", config.login.capacity);

    subheader("Profile images:");
    row("Root", config.images.root.display());
    row("Public URL", &config.images.public_base_url);
    row("Avatar URL", &config.images.avatar_base_url);
    row("Max size", format!("{} bytes", config.images.max_size));

    subheader("HTTP:");
    row("Max request", format!("{} bytes", config.http.max_request_size));
    row("Timeout", format!("{:?}", config.http.request_timeout));
    let cors = if config.http.cors_is_restrictive() {
        "same-origin".to_string()
    } else {
        config.http.cors_origins.join(", ")
    };
    row("CORS", cors);
    row("Security headers", config.http.security_headers_enabled);

    if config.http.cors_is_permissive() {
        println!();
        warning("CORS allows any origin");
    }
    if !config.http.security_headers_enabled {
        warning("Security headers are disabled");
    }
    println!();
}
