pub mod api;
pub mod core;

use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

#[flutter_rust_bridge::frb(sync)]
pub fn init_logging() {
    LOGGER.get_or_init(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("facecam_lib"),
            );
        }

        #[cfg(not(target_os = "android"))]
        {
            let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .format_timestamp_millis()
                .try_init();
        }

        log::info!("📝 logging initialized");
    });
}
