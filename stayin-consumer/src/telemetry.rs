//! 日志初始化
//!
//! JSON 格式输出，级别由 `RUST_LOG` 控制，默认 `info`。

use tracing_subscriber::EnvFilter;

/// 初始化进程级日志；重复调用无副作用
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
