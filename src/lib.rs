/// Operating system module: windows, message pump and input events.
pub mod os;

/// Graphics module: device, swap chain, command buffers and resources.
pub mod gfx;

/// Imgui context, input forwarding and draw data rendering using imgui_sys.
pub mod imgui;

/// Serialisable launch configuration.
pub mod config;

/// The frame renderer: one-time setup, per-frame render and shutdown.
pub mod renderer;

/// Owns the app, main window and renderer and drives the message pump.
pub mod client;

/// Use bitmask for flags
#[macro_use]
extern crate bitflags;

use thiserror::Error;

/// Errors produced by every module in the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A driver or api call failed and the failure is not recoverable.
    #[error("device error: {0}")]
    Device(String),
    /// The gpu was removed, reset or hung. Re-create the renderer to recover.
    #[error("device lost: {0}")]
    DeviceLost(String),
    #[error("window error: {0}")]
    Window(String),
    #[error("shader error: {0}")]
    Shader(String),
    /// A descriptor heap has no free slots left.
    #[error("heap error: {0}")]
    Heap(String),
    #[error("gui error: {0}")]
    Gui(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true when the error can be recovered from by re-creating the renderer.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::DeviceLost(_))
    }
}

// conversion for windows-rs win32 errors, device removal is the only recoverable case
#[cfg(target_os = "windows")]
impl From<windows::core::Error> for Error {
    fn from(err: windows::core::Error) -> Error {
        use windows::Win32::Graphics::Dxgi::{
            DXGI_ERROR_DEVICE_HUNG, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET,
        };
        let code = err.code();
        let msg = format!("{} ({:#010x})", err.message(), code.0);
        if code == DXGI_ERROR_DEVICE_REMOVED || code == DXGI_ERROR_DEVICE_RESET || code == DXGI_ERROR_DEVICE_HUNG {
            Error::DeviceLost(msg)
        }
        else {
            Error::Device(msg)
        }
    }
}

/// Returns the directory containing the running executable, config and imgui.ini live here.
pub fn get_data_dir() -> std::path::PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

/// Returns `asset` joined to the executable directory.
pub fn get_data_path(asset: &str) -> String {
    get_data_dir().join(asset).to_string_lossy().to_string()
}

/// Most commonly used types and traits, `use nilwindows::prelude::*`
pub mod prelude {
    pub use crate::{
        config,
        gfx,
        os,
        imgui,
        renderer,
        client,
        Error,
        gfx::{Device, SwapChain, CmdBuf, Buffer, Texture},
        os::{App, Window, NativeHandle},
        renderer::Renderer,
        client::Client,
        config::Config,
    };

    #[cfg(target_os = "windows")]
    pub use crate::os::win32 as os_platform;

    #[cfg(target_os = "windows")]
    pub use crate::gfx::d3d12 as gfx_platform;
}
