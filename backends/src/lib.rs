pub mod borg;
pub mod codecs;
pub mod locator;
pub mod process;
pub mod retry;
pub mod squashfs;
pub mod tar;

pub use borg::BorgRepository;
pub use codecs::SystemCodecs;
pub use locator::{ToolLocator, ToolStatus, Toolchain};
pub use retry::{RetryConfig, Retryable, retry_with_backoff};
pub use squashfs::SquashfsCodec;
pub use tar::TarCodec;
