use crate::locator::Toolchain;
use crate::squashfs::SquashfsCodec;
use crate::tar::TarCodec;
use borgpack_core::codec::{CodecFactory, ContainerCodec};
use borgpack_core::{CodecBackend, Compressor, PackTool, Result, Settings};

/// Process-backed codecs for the backend probed at startup.
pub struct SystemCodecs {
    toolchain: Toolchain,
    settings: Settings,
}

impl SystemCodecs {
    pub fn new(toolchain: Toolchain, settings: Settings) -> Self {
        Self {
            toolchain,
            settings,
        }
    }

    /// gzip-family streams are interchangeable; use pigz whenever it is
    /// installed.
    fn stream_compressor(&self, compressor: Compressor) -> Compressor {
        if !compressor.same_format(Compressor::Gzip) {
            compressor
        } else if self.toolchain.locator.has("pigz") {
            Compressor::Pigz
        } else {
            Compressor::Gzip
        }
    }
}

impl CodecFactory for SystemCodecs {
    fn preferred(&self) -> CodecBackend {
        self.toolchain.backend
    }

    fn codec(&self, backend: CodecBackend) -> Result<Box<dyn ContainerCodec>> {
        let locator = self.toolchain.locator.clone();
        let level = self.settings.level_for(backend.compressor);
        Ok(match backend.pack_tool {
            PackTool::Squashfs => Box::new(SquashfsCodec::new(locator, backend.compressor, level)),
            PackTool::Tar => {
                let compressor = self.stream_compressor(backend.compressor);
                Box::new(TarCodec::new(locator, compressor, level))
            }
        })
    }
}
