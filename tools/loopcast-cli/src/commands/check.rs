//! Check system capabilities.

use loopcast_common::config::AppConfig;
use loopcast_native_controller::{LargestAllowListed, WindowRanker};
use loopcast_platform_linux::permissions::{check_capabilities, print_capability_report};

pub fn run(config: AppConfig) -> anyhow::Result<()> {
    println!("loopcast System Check");
    println!("{}", "=".repeat(50));

    let server = loopcast_platform_linux::detect_display_server();
    if server.supports_window_capture() {
        println!("[OK] Display server: {server:?}");
    } else {
        println!("[WARN] Display server: {server:?} (window capture needs X11)");
    }

    match loopcast_platform_linux::list_windows() {
        Ok(windows) => {
            println!("[OK] Windows listed: {}", windows.len());
            let ranker = LargestAllowListed::from_rules(&config.target);
            match ranker.pick(&windows) {
                Ok(window) => println!(
                    "     Native host would record: {} \"{}\" {}x{}",
                    window.app_id, window.title, window.bounds.width, window.bounds.height
                ),
                Err(e) => println!("     {e}"),
            }
        }
        Err(e) => println!("[WARN] Window listing failed: {e}"),
    }

    let capabilities = check_capabilities(&config.service.ffmpeg_path);
    println!();
    print_capability_report(&capabilities);

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    println!("Job service: {}", config.client.server_url);
    if all_required_ok {
        println!("All required capabilities are available. loopcast is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
