use crate::config::Config;
use crate::gfx;
use crate::os;
use crate::renderer::Renderer;
use crate::Error;

use os::Window;

/// Device losses tolerated before `run` gives up and returns the error
pub const MAX_DEVICE_RESETS: usize = 8;

/// Information to create a client which will create an app, main window and renderer.
pub struct ClientInfo {
    pub config: Config,
    /// Headless apps quit after this many frames, platform apps run until the window closes
    pub max_frames: Option<usize>,
}

impl From<Config> for ClientInfo {
    fn from(config: Config) -> Self {
        ClientInfo {
            config,
            max_frames: None,
        }
    }
}

/// Owns the app, main window and renderer and drives the message pump
pub struct Client<D: gfx::Device, A: os::App> {
    pub app: A,
    pub main_window: A::Window,
    renderer: Renderer<D, A>,
    config: Config,
    device_resets: usize,
}

impl<D, A> Client<D, A> where D: gfx::Device, A: os::App {
    /// Create the app, register the window class, open the main window and initialise the renderer
    pub fn create(info: ClientInfo) -> Result<Self, Error> {
        info.config.validate()?;

        let mut app = A::create(os::AppInfo {
            name: info.config.title.clone(),
            max_frames: info.max_frames,
        })?;

        let main_window = app.create_window(os::WindowInfo {
            title: info.config.title.clone(),
            rect: info.config.window_rect,
            style: info.config.window_style(),
            parent_handle: None,
        })?;

        let renderer = Renderer::create(&info.config, &main_window)?;

        Ok(Client {
            app,
            main_window,
            renderer,
            config: info.config,
            device_resets: 0,
        })
    }

    /// Drain os messages and render one frame, returns false once the app has quit
    pub fn update(&mut self) -> Result<bool, Error> {
        if !self.app.run() {
            return Ok(false);
        }
        match self.renderer.render(&mut self.app, &mut self.main_window) {
            Ok(()) => Ok(true),
            Err(err) if err.is_recoverable() => {
                self.recover(err)?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    fn recover(&mut self, err: Error) -> Result<(), Error> {
        if self.device_resets >= MAX_DEVICE_RESETS {
            log::error!("nilwindows::client: giving up after {} device resets", self.device_resets);
            return Err(err);
        }
        log::warn!("nilwindows::client: {}, re-creating the renderer", err);

        // a lost device cannot be waited on, the old objects are released regardless
        if let Err(destroy_err) = self.renderer.destroy() {
            log::warn!("nilwindows::client: destroy after device loss: {}", destroy_err);
        }
        self.renderer = Renderer::create(&self.config, &self.main_window)?;
        self.device_resets += 1;
        log::info!("nilwindows::client: renderer re-created ({} resets)", self.device_resets);
        Ok(())
    }

    /// Run until the app quits, then wait for the gpu and tear down the renderer
    pub fn run(&mut self) -> Result<(), Error> {
        let result = loop {
            match self.update() {
                Ok(true) => (),
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        log::info!("nilwindows::client: shutting down");
        let destroyed = self.renderer.destroy();
        result.and(destroyed)
    }

    /// Ask the app to quit, the next `update` returns false
    pub fn request_quit(&mut self) {
        self.app.request_quit();
    }

    /// Number of times the renderer was re-created after a device loss
    pub fn get_device_resets(&self) -> usize {
        self.device_resets
    }

    pub fn get_renderer(&self) -> &Renderer<D, A> {
        &self.renderer
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// Size of the main window client area
    pub fn get_window_size(&self) -> os::Size<i32> {
        self.main_window.get_size()
    }
}
