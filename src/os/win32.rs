use crate::os::{Event, MonitorInfo, MouseButton, Point, Rect, Size, WindowInfo, WindowStyleFlags};
use crate::Error;

use windows::{
    core::HSTRING,
    Win32::Foundation::*,
    Win32::Graphics::Gdi::{ClientToScreen, EnumDisplayMonitors, GetMonitorInfoW, ValidateRect, HDC, HMONITOR, MONITORINFO},
    Win32::System::LibraryLoader::*,
    Win32::UI::Input::KeyboardAndMouse::*,
    Win32::UI::WindowsAndMessaging::*,
};

/// Registers the window class and pumps the thread message queue
pub struct App {
    window_class: HSTRING,
    hinstance: HINSTANCE,
    quit: bool,
}

/// Per window state reached from `wndproc` through `GWLP_USERDATA`, owned by `Window`
#[derive(Default)]
struct WindowState {
    events: Vec<Event>,
    mouse_tracked: bool,
    mouse_down: [bool; 5],
    focused: bool,
    destroyed: bool,
    /// Top level windows post a quit message when destroyed, owned windows only report `Event::Close`
    quit_on_destroy: bool,
}

/// Owned window context, there is no process wide window handle
pub struct Window {
    hwnd: HWND,
    rect: Rect<i32>,
    state: Box<WindowState>,
}

#[derive(Clone, Copy)]
pub struct NativeHandle {
    pub hwnd: HWND,
}

impl super::NativeHandle<App> for NativeHandle {
    fn get_isize(&self) -> isize {
        self.hwnd.0 as isize
    }
}

impl Window {
    pub fn get_hwnd(&self) -> HWND {
        self.hwnd
    }

    fn destroy(&mut self) {
        if self.state.destroyed {
            return;
        }
        unsafe {
            // detach state so messages sent during destruction do not reach it
            SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, 0);
            if let Err(err) = DestroyWindow(self.hwnd) {
                log::warn!("nilwindows::os::win32: DestroyWindow failed: {}", err);
            }
            if self.state.quit_on_destroy {
                PostQuitMessage(0);
            }
        }
        self.state.destroyed = true;
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        unsafe {
            let _ = UnregisterClassW(&self.window_class, self.hinstance);
        }
    }
}

fn window_style(flags: WindowStyleFlags) -> (WINDOW_STYLE, WINDOW_EX_STYLE) {
    if flags.contains(WindowStyleFlags::POPUP) {
        (WS_POPUP, WS_EX_TOOLWINDOW)
    }
    else if flags.contains(WindowStyleFlags::RESIZABLE) {
        (WS_OVERLAPPEDWINDOW | WS_VISIBLE, WINDOW_EX_STYLE::default())
    }
    else {
        ((WS_OVERLAPPEDWINDOW & !WS_THICKFRAME & !WS_MAXIMIZEBOX) | WS_VISIBLE, WINDOW_EX_STYLE::default())
    }
}

/// Outer window rect for a client `rect` in screen space
fn outer_rect(rect: &Rect<i32>, style: WINDOW_STYLE, ex_style: WINDOW_EX_STYLE) -> Result<RECT, Error> {
    let mut outer = RECT {
        left: rect.x,
        top: rect.y,
        right: rect.x + rect.width,
        bottom: rect.y + rect.height,
    };
    unsafe {
        AdjustWindowRectEx(&mut outer, style, false, ex_style)?;
    }
    Ok(outer)
}

unsafe extern "system" fn enum_monitor(monitor: HMONITOR, _hdc: HDC, _clip: *mut RECT, data: LPARAM) -> BOOL {
    // MONITORINFOF_PRIMARY
    const PRIMARY: u32 = 1;
    let monitors = &mut *(data.0 as *mut Vec<MonitorInfo>);
    let mut info = MONITORINFO {
        cbSize: std::mem::size_of::<MONITORINFO>() as u32,
        ..Default::default()
    };
    if GetMonitorInfoW(monitor, &mut info).as_bool() {
        let to_rect = |r: RECT| Rect {
            x: r.left,
            y: r.top,
            width: r.right - r.left,
            height: r.bottom - r.top,
        };
        monitors.push(MonitorInfo {
            rect: to_rect(info.rcMonitor),
            work_rect: to_rect(info.rcWork),
            primary: info.dwFlags & PRIMARY != 0,
        });
    }
    TRUE
}

impl super::App for App {
    type Window = Window;
    type NativeHandle = NativeHandle;

    fn create(info: super::AppInfo) -> Result<Self, Error> {
        unsafe {
            let window_class = HSTRING::from(info.name.as_str());
            let instance: HINSTANCE = GetModuleHandleW(None)?.into();

            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                hCursor: LoadCursorW(None, IDC_ARROW)?,
                hInstance: instance,
                lpszClassName: windows::core::PCWSTR(window_class.as_ptr()),
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(wndproc),
                ..Default::default()
            };

            if RegisterClassExW(&wc) == 0 {
                let err = GetLastError();
                if err != ERROR_CLASS_ALREADY_EXISTS {
                    return Err(Error::Window(format!(
                        "failed to register window class {}: {:?}", info.name, err)));
                }
            }

            Ok(App {
                window_class,
                hinstance: instance,
                quit: false,
            })
        }
    }

    fn create_window(&mut self, info: WindowInfo) -> Result<Window, Error> {
        unsafe {
            let (style, ex_style) = window_style(info.style);

            // grow the outer rect so the client area matches the requested size
            let outer = outer_rect(&info.rect, style, ex_style)?;
            let parent = info.parent_handle.map(|handle| HWND(handle as *mut std::ffi::c_void));

            let mut state = Box::new(WindowState {
                quit_on_destroy: parent.is_none(),
                ..Default::default()
            });
            let state_ptr: *mut WindowState = &mut *state;

            let hwnd = CreateWindowExW(
                ex_style,
                &self.window_class,
                &HSTRING::from(info.title.as_str()),
                style,
                outer.left,
                outer.top,
                outer.right - outer.left,
                outer.bottom - outer.top,
                parent.unwrap_or_default(),
                None,
                self.hinstance,
                Some(state_ptr as *const std::ffi::c_void),
            )?;

            // popups wait for `show`
            if !info.style.contains(WindowStyleFlags::POPUP) {
                let _ = ShowWindow(hwnd, SW_SHOW);
            }
            log::info!("nilwindows::os::win32: created window '{}' {}x{}", info.title, info.rect.width, info.rect.height);

            let mut window = Window {
                hwnd,
                rect: info.rect,
                state,
            };
            window.read_rect();
            Ok(window)
        }
    }

    fn run(&mut self) -> bool {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
                if msg.message == WM_QUIT {
                    self.quit = true;
                }
            }
        }
        !self.quit
    }

    fn request_quit(&mut self) {
        unsafe {
            PostQuitMessage(0);
        }
    }

    fn get_monitors(&self) -> Vec<MonitorInfo> {
        let mut monitors: Vec<MonitorInfo> = Vec::new();
        unsafe {
            let data = LPARAM(&mut monitors as *mut Vec<MonitorInfo> as isize);
            if !EnumDisplayMonitors(None, None, Some(enum_monitor), data).as_bool() {
                log::warn!("nilwindows::os::win32: EnumDisplayMonitors failed");
            }
        }
        monitors.sort_by_key(|m| !m.primary);
        monitors
    }
}

impl Window {
    fn read_rect(&mut self) {
        if self.state.destroyed {
            return;
        }
        unsafe {
            let mut client = RECT::default();
            if GetClientRect(self.hwnd, &mut client).is_ok() {
                let mut origin = POINT::default();
                let _ = ClientToScreen(self.hwnd, &mut origin);
                self.rect = Rect {
                    x: origin.x,
                    y: origin.y,
                    width: client.right - client.left,
                    height: client.bottom - client.top,
                };
            }
        }
    }
}

impl super::Window<App> for Window {
    fn update(&mut self, _app: &mut App) {
        self.read_rect();
    }

    fn bring_to_front(&self) {
        unsafe {
            let _ = SetForegroundWindow(self.hwnd);
            let _ = SetFocus(self.hwnd);
            let _ = ShowWindow(self.hwnd, SW_RESTORE);
        }
    }

    fn get_size(&self) -> Size<i32> {
        Size {
            x: self.rect.width,
            y: self.rect.height,
        }
    }

    fn get_viewport_rect(&self) -> Rect<i32> {
        Rect {
            x: 0,
            y: 0,
            width: self.rect.width,
            height: self.rect.height,
        }
    }

    fn get_window_rect(&self) -> Rect<i32> {
        self.rect
    }

    fn get_native_handle(&self) -> NativeHandle {
        NativeHandle { hwnd: self.hwnd }
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.state.events)
    }

    fn is_focused(&self) -> bool {
        self.state.focused
    }

    fn is_minimised(&self) -> bool {
        if self.state.destroyed {
            return false;
        }
        unsafe { IsIconic(self.hwnd).as_bool() }
    }

    fn set_rect(&mut self, rect: Rect<i32>) {
        if self.state.destroyed {
            return;
        }
        unsafe {
            let style = WINDOW_STYLE(GetWindowLongW(self.hwnd, GWL_STYLE) as u32);
            let ex_style = WINDOW_EX_STYLE(GetWindowLongW(self.hwnd, GWL_EXSTYLE) as u32);
            match outer_rect(&rect, style, ex_style) {
                Ok(outer) => {
                    if let Err(err) = SetWindowPos(
                        self.hwnd,
                        None,
                        outer.left,
                        outer.top,
                        outer.right - outer.left,
                        outer.bottom - outer.top,
                        SWP_NOZORDER | SWP_NOACTIVATE,
                    ) {
                        log::warn!("nilwindows::os::win32: SetWindowPos failed: {}", err);
                    }
                }
                Err(err) => log::warn!("nilwindows::os::win32: AdjustWindowRectEx failed: {}", err),
            }
        }
        self.read_rect();
    }

    fn set_title(&mut self, title: &str) {
        if self.state.destroyed {
            return;
        }
        unsafe {
            if let Err(err) = SetWindowTextW(self.hwnd, &HSTRING::from(title)) {
                log::warn!("nilwindows::os::win32: SetWindowTextW failed: {}", err);
            }
        }
    }

    fn show(&mut self, focus: bool) {
        if self.state.destroyed {
            return;
        }
        unsafe {
            let _ = ShowWindow(self.hwnd, if focus { SW_SHOW } else { SW_SHOWNA });
        }
    }

    fn close(&mut self) {
        self.destroy();
    }
}

/// Bit 24 of the key message lparam marks extended keys
fn key_code(wparam: WPARAM, lparam: LPARAM) -> u32 {
    let extended = (lparam.0 >> 24) & 1 == 1;
    super::key_code(wparam.0 as u32, extended)
}

fn loword(v: isize) -> i32 {
    (v & 0xffff) as i16 as i32
}

fn hiword(v: isize) -> i32 {
    ((v >> 16) & 0xffff) as i16 as i32
}

impl WindowState {
    fn button_down(&mut self, window: HWND, button: MouseButton) {
        unsafe {
            if !self.mouse_down.iter().any(|d| *d) && GetCapture().is_invalid() {
                SetCapture(window);
            }
        }
        self.mouse_down[button.index()] = true;
        self.events.push(Event::MouseButton { button, down: true });
    }

    fn button_up(&mut self, window: HWND, button: MouseButton) {
        self.mouse_down[button.index()] = false;
        unsafe {
            if !self.mouse_down.iter().any(|d| *d) && GetCapture() == window {
                let _ = ReleaseCapture();
            }
        }
        self.events.push(Event::MouseButton { button, down: false });
    }

    /// Queues events for the gui, returns true if the message is fully handled
    fn handle_message(&mut self, window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> bool {
        let xbutton = || {
            // XBUTTON1
            if hiword(wparam.0 as isize) == 1 {
                MouseButton::X1
            }
            else {
                MouseButton::X2
            }
        };
        match message {
            WM_MOUSEMOVE => {
                if !self.mouse_tracked {
                    // required to receive WM_MOUSELEAVE
                    unsafe {
                        let _ = TrackMouseEvent(&mut TRACKMOUSEEVENT {
                            cbSize: std::mem::size_of::<TRACKMOUSEEVENT>() as u32,
                            dwFlags: TME_LEAVE,
                            hwndTrack: window,
                            dwHoverTime: 0,
                        });
                    }
                    self.mouse_tracked = true;
                }
                self.events.push(Event::MouseMove(Point {
                    x: loword(lparam.0),
                    y: hiword(lparam.0),
                }));
                true
            }
            WM_MOUSELEAVE => {
                self.mouse_tracked = false;
                self.events.push(Event::MouseLeave);
                true
            }
            WM_LBUTTONDOWN | WM_LBUTTONDBLCLK => {
                self.button_down(window, MouseButton::Left);
                true
            }
            WM_RBUTTONDOWN | WM_RBUTTONDBLCLK => {
                self.button_down(window, MouseButton::Right);
                true
            }
            WM_MBUTTONDOWN | WM_MBUTTONDBLCLK => {
                self.button_down(window, MouseButton::Middle);
                true
            }
            WM_XBUTTONDOWN | WM_XBUTTONDBLCLK => {
                self.button_down(window, xbutton());
                true
            }
            WM_LBUTTONUP => {
                self.button_up(window, MouseButton::Left);
                true
            }
            WM_RBUTTONUP => {
                self.button_up(window, MouseButton::Right);
                true
            }
            WM_MBUTTONUP => {
                self.button_up(window, MouseButton::Middle);
                true
            }
            WM_XBUTTONUP => {
                self.button_up(window, xbutton());
                true
            }
            WM_MOUSEWHEEL => {
                self.events.push(Event::MouseWheel(hiword(wparam.0 as isize) as f32 / WHEEL_DELTA as f32));
                true
            }
            WM_MOUSEHWHEEL => {
                self.events.push(Event::MouseHWheel(hiword(wparam.0 as isize) as f32 / WHEEL_DELTA as f32));
                true
            }
            WM_KEYDOWN | WM_SYSKEYDOWN => {
                self.events.push(Event::Key { code: key_code(wparam, lparam), down: true });
                false
            }
            WM_KEYUP | WM_SYSKEYUP => {
                self.events.push(Event::Key { code: key_code(wparam, lparam), down: false });
                false
            }
            WM_CHAR => {
                self.events.push(Event::Char(wparam.0 as u32));
                true
            }
            WM_SETFOCUS => {
                self.focused = true;
                self.events.push(Event::Focus(true));
                false
            }
            WM_KILLFOCUS => {
                self.focused = false;
                self.events.push(Event::Focus(false));
                false
            }
            WM_SIZE => {
                self.events.push(Event::Resize(Size {
                    x: (lparam.0 & 0xffff) as i32,
                    y: ((lparam.0 >> 16) & 0xffff) as i32,
                }));
                false
            }
            WM_CLOSE => {
                self.events.push(Event::Close);
                // owned windows are closed by their owner
                !self.quit_on_destroy
            }
            WM_DESTROY => {
                self.destroyed = true;
                if self.quit_on_destroy {
                    unsafe {
                        PostQuitMessage(0);
                    }
                }
                true
            }
            _ => false,
        }
    }
}

extern "system" fn wndproc(window: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe {
        if message == WM_NCCREATE {
            let create = lparam.0 as *const CREATESTRUCTW;
            SetWindowLongPtrW(window, GWLP_USERDATA, (*create).lpCreateParams as isize);
            return DefWindowProcW(window, message, wparam, lparam);
        }

        let state = GetWindowLongPtrW(window, GWLP_USERDATA) as *mut WindowState;
        if let Some(state) = state.as_mut() {
            if state.handle_message(window, message, wparam, lparam) {
                return LRESULT(0);
            }
        }

        match message {
            WM_PAINT => {
                let _ = ValidateRect(window, None);
                LRESULT(0)
            }
            _ => DefWindowProcW(window, message, wparam, lparam),
        }
    }
}
