use crate::os::{AppInfo, Event, MonitorInfo, Rect, Size, WindowInfo, WindowStyleFlags};
use crate::Error;

/// Headless app, `run` returns false after `max_frames` calls or once a quit is requested
pub struct App {
    name: String,
    max_frames: Option<usize>,
    frame: usize,
    quit_requested: bool,
    next_window_id: isize,
}

/// Headless window, events are injected with `push_event` instead of coming from the os
pub struct Window {
    id: isize,
    title: String,
    rect: Rect<i32>,
    events: Vec<Event>,
    focused: bool,
    visible: bool,
    closed: bool,
    parent_handle: Option<isize>,
}

/// The single monitor reported by `App::get_monitors`
pub const MONITOR_RECT: Rect<i32> = Rect {
    x: 0,
    y: 0,
    width: 1920,
    height: 1080,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeHandle {
    pub id: isize,
}

impl super::NativeHandle<App> for NativeHandle {
    fn get_isize(&self) -> isize {
        self.id
    }
}

impl App {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Number of completed calls to `run`
    pub fn get_frame(&self) -> usize {
        self.frame
    }
}

impl super::App for App {
    type Window = Window;
    type NativeHandle = NativeHandle;

    fn create(info: AppInfo) -> Result<Self, Error> {
        Ok(App {
            name: info.name,
            max_frames: info.max_frames,
            frame: 0,
            quit_requested: false,
            next_window_id: 1,
        })
    }

    fn create_window(&mut self, info: WindowInfo) -> Result<Window, Error> {
        if info.rect.width <= 0 || info.rect.height <= 0 {
            return Err(Error::Window(format!(
                "invalid window size {}x{}", info.rect.width, info.rect.height)));
        }
        let id = self.next_window_id;
        self.next_window_id += 1;
        let popup = info.style.contains(WindowStyleFlags::POPUP);
        Ok(Window {
            id,
            title: info.title,
            rect: info.rect,
            events: Vec::new(),
            focused: !popup,
            visible: !popup,
            closed: false,
            parent_handle: info.parent_handle,
        })
    }

    fn run(&mut self) -> bool {
        if self.quit_requested {
            return false;
        }
        if let Some(max) = self.max_frames {
            if self.frame >= max {
                return false;
            }
        }
        self.frame += 1;
        true
    }

    fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    fn get_monitors(&self) -> Vec<MonitorInfo> {
        vec![MonitorInfo {
            rect: MONITOR_RECT,
            work_rect: Rect {
                height: MONITOR_RECT.height - 40,
                ..MONITOR_RECT
            },
            primary: true,
        }]
    }
}

impl Window {
    pub fn get_title(&self) -> &str {
        &self.title
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn get_parent_handle(&self) -> Option<isize> {
        self.parent_handle
    }

    /// Queue an event as if the os had sent it
    pub fn push_event(&mut self, event: Event) {
        match event {
            Event::Focus(focused) => self.focused = focused,
            Event::Resize(size) => {
                self.rect.width = size.x;
                self.rect.height = size.y;
            }
            _ => (),
        }
        self.events.push(event);
    }

    /// Resize the client area and queue the matching `Event::Resize`
    pub fn set_size(&mut self, width: i32, height: i32) {
        self.push_event(Event::Resize(Size {
            x: width,
            y: height,
        }));
    }
}

impl super::Window<App> for Window {
    fn update(&mut self, _app: &mut App) {}

    fn bring_to_front(&self) {}

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
        NativeHandle { id: self.id }
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn is_focused(&self) -> bool {
        self.focused
    }

    fn is_minimised(&self) -> bool {
        false
    }

    fn set_rect(&mut self, rect: Rect<i32>) {
        self.rect = rect;
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn show(&mut self, focus: bool) {
        self.visible = true;
        if focus {
            self.focused = true;
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::{App as _, Window as _};

    #[test]
    fn run_stops_after_max_frames() {
        let mut app = App::create(AppInfo {
            name: "test".to_string(),
            max_frames: Some(3),
        }).unwrap();
        let mut count = 0;
        while app.run() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert!(!app.run());
    }

    #[test]
    fn request_quit_stops_run() {
        let mut app = App::create(AppInfo {
            name: "test".to_string(),
            max_frames: None,
        }).unwrap();
        assert!(app.run());
        app.request_quit();
        assert!(!app.run());
    }

    #[test]
    fn set_size_queues_resize() {
        let mut app = App::create(AppInfo {
            name: "test".to_string(),
            max_frames: None,
        }).unwrap();
        let mut window = app.create_window(WindowInfo::default()).unwrap();
        window.set_size(640, 480);
        assert_eq!(window.get_size(), Size { x: 640, y: 480 });
        let events = window.take_events();
        assert_eq!(events, vec![Event::Resize(Size { x: 640, y: 480 })]);
        assert!(window.take_events().is_empty());
    }

    #[test]
    fn popup_is_hidden_until_shown() {
        let mut app = App::create(AppInfo {
            name: "test".to_string(),
            max_frames: None,
        }).unwrap();
        let main = app.create_window(WindowInfo::default()).unwrap();
        let mut popup = app.create_window(WindowInfo {
            title: "popup".to_string(),
            style: WindowStyleFlags::POPUP,
            parent_handle: Some(main.get_native_handle().id),
            ..WindowInfo::default()
        }).unwrap();
        assert!(!popup.is_visible());
        assert_eq!(popup.get_parent_handle(), Some(1));

        popup.show(false);
        assert!(popup.is_visible());
        assert!(!popup.is_focused());

        let rect = Rect {
            x: 2000,
            y: 10,
            width: 200,
            height: 100,
        };
        popup.set_rect(rect);
        assert_eq!(popup.get_window_rect(), rect);
        assert_eq!(popup.get_viewport_rect().x, 0);
        assert_eq!(app.get_monitors().len(), 1);
    }
}
