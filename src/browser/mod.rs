//! 浏览器会话管理
//!
//! - `launcher` - 启动回退链与每个进程唯一的会话持有者
//! - `session` - chromiumoxide 会话：反检测设置、页面渲染文本读取

pub mod launcher;
pub mod session;

pub use launcher::{launch_with_fallback, SessionLauncher, SessionManager};
pub use session::{BrowserSession, ChromeLauncher};
