/// Main entry point for the placement engine
///
/// A thin wrapper that delegates to the interfaces layer.
/// The actual application logic is implemented in `interfaces::cli`.

// 全局内存分配器：使用 jemalloc
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use placement_engine::interfaces::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("placement-engine: {}", e);
        std::process::exit(1);
    }
}
