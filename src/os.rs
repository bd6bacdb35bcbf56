/// Implements this interface for windows win32 platfrom
#[cfg(target_os = "windows")]
pub mod win32;

/// Headless implementation, runs a scripted number of frames and accepts injected events
pub mod null;

use crate::Error;

use serde::{Deserialize, Serialize};
use std::any::Any;

/// Describes a rectangle starting at the top left corner specified by x,y
/// with the size of width and height.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect<T> {
    pub x: T,
    pub y: T,
    pub width: T,
    pub height: T,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Size<T> {
    pub x: T,
    pub y: T,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

bitflags! {
    /// Window style flags
    pub struct WindowStyleFlags: u32 {
        /// Fixed size overlapped window
        const NONE = 0;
        /// Thick frame and maximise box
        const RESIZABLE = 1 << 0;
        /// Borderless with no task bar entry, hidden until `Window::show`
        const POPUP = 1 << 1;
    }
}

/// A display attached to the desktop, rects are in screen space
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MonitorInfo {
    pub rect: Rect<i32>,
    /// Monitor rect minus the task bar
    pub work_rect: Rect<i32>,
    pub primary: bool,
}

/// Information to create an app, the name is used to register the window class
pub struct AppInfo {
    pub name: String,
    /// Headless apps quit after this many calls to `App::run`, ignored by platform apps
    pub max_frames: Option<usize>,
}

/// Filled out to specify various window parameters
/// when a window is created by `App::create_window`
#[derive(Clone)]
pub struct WindowInfo {
    pub title: String,
    /// Client area rect
    pub rect: Rect<i32>,
    pub style: WindowStyleFlags,
    /// Owner window, owned windows are kept above it and do not quit the app when destroyed
    pub parent_handle: Option<isize>,
}

impl Default for WindowInfo {
    fn default() -> Self {
        WindowInfo {
            title: "NilWindows".to_string(),
            rect: Rect {
                x: 100,
                y: 100,
                width: 1280,
                height: 720,
            },
            style: WindowStyleFlags::RESIZABLE,
            parent_handle: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl MouseButton {
    /// Index into imgui `MouseDown`
    pub fn index(&self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Right => 1,
            MouseButton::Middle => 2,
            MouseButton::X1 => 3,
            MouseButton::X2 => 4,
        }
    }
}

/// Platform independent window messages, queued by the window procedure and
/// consumed by the gui platform handler once per frame
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Event {
    /// Cursor position in client coordinates
    MouseMove(Point<i32>),
    MouseLeave,
    MouseButton { button: MouseButton, down: bool },
    /// Vertical wheel in notches, positive is away from the user
    MouseWheel(f32),
    MouseHWheel(f32),
    /// Virtual key code, see `key_code`
    Key { code: u32, down: bool },
    /// utf-16 code unit
    Char(u32),
    Focus(bool),
    /// New client size
    Resize(Size<i32>),
    Close,
}

const VK_RETURN: u32 = 0x0d;

/// Code reported for the enter key on the numeric keypad, outside the 0-255 virtual key range
pub const VK_KEYPAD_ENTER: u32 = VK_RETURN + 256;

/// Maps a virtual key and the extended key flag to the code carried by `Event::Key`.
/// Both enter keys share VK_RETURN, the keypad one is extended.
pub fn key_code(vk: u32, extended: bool) -> u32 {
    if vk == VK_RETURN && extended {
        VK_KEYPAD_ENTER
    }
    else {
        vk
    }
}

/// The native window handle as an integer for graphics apis to bind to
pub trait NativeHandle<A: App> {
    fn get_isize(&self) -> isize;
}

/// An interface which all platforms need to implement for general operating system calls
pub trait App: 'static + Any + Sized {
    type Window: Window<Self>;
    type NativeHandle: NativeHandle<Self>;
    /// Create an application instance and register the window class
    fn create(info: AppInfo) -> Result<Self, Error>;
    /// Create a new operating system window
    fn create_window(&mut self, info: WindowInfo) -> Result<Self::Window, Error>;
    /// Drains all pending os messages, returns false once a quit message has been seen
    fn run(&mut self) -> bool;
    /// Post a quit message, the next call to `run` returns false
    fn request_quit(&mut self);
    /// Attached monitors, the primary monitor first
    fn get_monitors(&self) -> Vec<MonitorInfo>;
}

/// An instance of an operating system window
pub trait Window<A: App>: 'static + Any + Sized {
    /// Refresh the cached rect from the os
    fn update(&mut self, app: &mut A);
    fn bring_to_front(&self);
    /// Client area size
    fn get_size(&self) -> Size<i32>;
    /// Client area rect with a 0, 0 origin suitable for viewport and scissor
    fn get_viewport_rect(&self) -> Rect<i32>;
    /// Client rect position in screen space
    fn get_window_rect(&self) -> Rect<i32>;
    fn get_native_handle(&self) -> A::NativeHandle;
    /// Take all events queued since the last call
    fn take_events(&mut self) -> Vec<Event>;
    fn is_focused(&self) -> bool;
    fn is_minimised(&self) -> bool;
    /// Move and resize so the client area covers `rect` in screen space
    fn set_rect(&mut self, rect: Rect<i32>);
    fn set_title(&mut self, title: &str);
    /// Make the window visible, `focus` also activates it
    fn show(&mut self, focus: bool);
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypad_enter_is_told_apart_by_the_extended_flag() {
        assert_eq!(key_code(VK_RETURN, false), VK_RETURN);
        assert_eq!(key_code(VK_RETURN, true), VK_KEYPAD_ENTER);
        // other extended keys keep their code
        assert_eq!(key_code(0x25, true), 0x25);
        assert!(VK_KEYPAD_ENTER < 512);
    }
}
