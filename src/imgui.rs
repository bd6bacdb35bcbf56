use imgui_sys::*;

use crate::config::GuiConfig;
use crate::gfx;
use crate::gfx::{Buffer, CmdBuf, Device, SwapChain, Texture};
use crate::os;
use crate::os::{Event, NativeHandle, Window};
use crate::Error;

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

/// Information required to create the gui renderer, the font atlas takes one slot in the device shader heap
pub struct ImGuiInfo<'a, D: Device, A: os::App> {
    pub device: &'a mut D,
    /// Hosts the main viewport and owns the secondary platform windows
    pub main_window: &'a A::Window,
    /// One vertex / index buffer pair is allocated per swap chain buffer
    pub num_buffers: u32,
    pub render_target_format: gfx::Format,
    pub config: &'a GuiConfig,
}

/// Owns the Dear ImGui context and the gpu resources used to draw it
pub struct ImGui<D: Device, A: os::App> {
    ctx: *mut ImGuiContext,
    ini_filename: Option<CString>,
    viewports: bool,
    dock_space: bool,
    frame_open: bool,
    font_texture: D::Texture,
    pipeline: D::RenderPipeline,
    buffers: Vec<RenderBuffers<D>>,
    keys_down: [bool; 512],
    num_buffers: u32,
    render_target_format: gfx::Format,
    main_handle: isize,
    monitors_dirty: bool,
    /// Window which last moved the mouse, leave events from other windows are ignored
    mouse_window: Option<isize>,
    _app: std::marker::PhantomData<A>,
}

struct RenderBuffers<D: Device> {
    vb: D::Buffer,
    ib: D::Buffer,
    vb_size: usize,
    ib_size: usize,
}

/// Platform window state for one viewport, boxed in `ImGuiViewport::PlatformUserData`.
/// The platform callbacks only record requests, `ImGui::update_platform_windows` applies them.
struct ViewportData<D: Device, A: os::App> {
    swap_chain: Option<D::SwapChain>,
    cmd_buf: Option<D::CmdBuf>,
    buffers: Vec<RenderBuffers<D>>,
    /// `None` for the main viewport, its window belongs to the client
    window: Option<A::Window>,
    pos: ImVec2,
    size: ImVec2,
    title: String,
    rect_dirty: bool,
    title_dirty: bool,
    /// Pending show, `true` also takes focus
    show: Option<bool>,
    focus_requested: bool,
    focused: bool,
    minimised: bool,
}

impl<D, A> ViewportData<D, A> where D: Device, A: os::App {
    fn new(pos: ImVec2, size: ImVec2) -> Self {
        ViewportData {
            swap_chain: None,
            cmd_buf: None,
            buffers: Vec::new(),
            window: None,
            pos,
            size,
            title: String::new(),
            rect_dirty: false,
            title_dirty: false,
            show: None,
            focus_requested: false,
            focused: false,
            minimised: false,
        }
    }

    fn rect(&self) -> os::Rect<i32> {
        os::Rect {
            x: self.pos.x as i32,
            y: self.pos.y as i32,
            width: (self.size.x as i32).max(1),
            height: (self.size.y as i32).max(1),
        }
    }

    /// Mirror the os window state read back by the platform callbacks
    fn read_window(&mut self, window: &A::Window) {
        let rect = window.get_window_rect();
        self.pos = ImVec2 {
            x: rect.x as f32,
            y: rect.y as f32,
        };
        self.size = ImVec2 {
            x: rect.width as f32,
            y: rect.height as f32,
        };
        self.focused = window.is_focused();
        self.minimised = window.is_minimised();
    }
}

/// Clear colour of secondary platform windows
const PLATFORM_WINDOW_CLEAR_COLOUR: gfx::ClearColour = gfx::ClearColour {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

const INITIAL_VERTEX_COUNT: usize = 5000;
const INITIAL_INDEX_COUNT: usize = 10000;

/// win32 virtual key codes, the null platform reports the same codes
mod vk {
    pub const BACK: u32 = 0x08;
    pub const TAB: u32 = 0x09;
    pub const RETURN: u32 = 0x0d;
    pub const SHIFT: u32 = 0x10;
    pub const CONTROL: u32 = 0x11;
    pub const MENU: u32 = 0x12;
    pub const ESCAPE: u32 = 0x1b;
    pub const SPACE: u32 = 0x20;
    pub const PRIOR: u32 = 0x21;
    pub const NEXT: u32 = 0x22;
    pub const END: u32 = 0x23;
    pub const HOME: u32 = 0x24;
    pub const LEFT: u32 = 0x25;
    pub const UP: u32 = 0x26;
    pub const RIGHT: u32 = 0x27;
    pub const DOWN: u32 = 0x28;
    pub const INSERT: u32 = 0x2d;
    pub const DELETE: u32 = 0x2e;
    pub const LWIN: u32 = 0x5b;
    pub const RWIN: u32 = 0x5c;
}

const SHADER_SOURCE: &str = "
    cbuffer vertexBuffer : register(b0)
    {
        float4x4 ProjectionMatrix;
    };

    struct VS_INPUT
    {
        float2 pos : POSITION;
        float4 col : COLOR0;
        float2 uv  : TEXCOORD0;
    };

    struct PS_INPUT
    {
        float4 pos : SV_POSITION;
        float4 col : COLOR0;
        float2 uv  : TEXCOORD0;
    };

    PS_INPUT VSMain(VS_INPUT input)
    {
        PS_INPUT output;
        output.pos = mul(ProjectionMatrix, float4(input.pos.xy, 0.0, 1.0));
        output.col = input.col;
        output.uv  = input.uv;
        return output;
    }

    SamplerState sampler0 : register(s0);
    Texture2D texture0 : register(t0);

    float4 PSMain(PS_INPUT input) : SV_Target
    {
        float4 out_col = input.col * texture0.Sample(sampler0, input.uv);
        return out_col;
    }";

fn create_fonts_texture<D: Device>(device: &mut D) -> Result<D::Texture, Error> {
    unsafe {
        let io = &mut *igGetIO();
        let mut out_pixels: *mut u8 = std::ptr::null_mut();
        let mut out_width = 0;
        let mut out_height = 0;
        let mut out_bytes_per_pixel = 0;
        ImFontAtlas_GetTexDataAsRGBA32(io.Fonts, &mut out_pixels, &mut out_width, &mut out_height, &mut out_bytes_per_pixel);
        if out_pixels.is_null() || out_width <= 0 || out_height <= 0 {
            return Err(Error::Gui("failed to build the font atlas".to_string()));
        }

        let data_size = out_bytes_per_pixel * out_width * out_height;
        let data_slice = std::slice::from_raw_parts(out_pixels, data_size as usize);

        let tex_info = gfx::TextureInfo {
            format: gfx::Format::RGBA8n,
            width: out_width as u64,
            height: out_height as u64,
            usage: gfx::TextureUsage::SHADER_RESOURCE,
        };
        device.create_texture(&tex_info, Some(data_slice))
    }
}

fn create_render_pipeline<D: Device>(device: &D, render_target_format: gfx::Format) -> Result<D::RenderPipeline, Error> {
    let vs_info = gfx::ShaderInfo {
        shader_type: gfx::ShaderType::Vertex,
        compile_info: Some(gfx::ShaderCompileInfo {
            entry_point: String::from("VSMain"),
            target: String::from("vs_5_0"),
        }),
    };

    let fs_info = gfx::ShaderInfo {
        shader_type: gfx::ShaderType::Fragment,
        compile_info: Some(gfx::ShaderCompileInfo {
            entry_point: String::from("PSMain"),
            target: String::from("ps_5_0"),
        }),
    };

    let vs = device.create_shader(&vs_info, SHADER_SOURCE.as_bytes())?;
    let fs = device.create_shader(&fs_info, SHADER_SOURCE.as_bytes())?;

    device.create_render_pipeline(&gfx::RenderPipelineInfo {
        vs: &vs,
        fs: &fs,
        input_layout: vec![
            gfx::InputElementInfo {
                semantic: String::from("POSITION"),
                index: 0,
                format: gfx::Format::RG32f,
                input_slot: 0,
                aligned_byte_offset: 0,
            },
            gfx::InputElementInfo {
                semantic: String::from("TEXCOORD"),
                index: 0,
                format: gfx::Format::RG32f,
                input_slot: 0,
                aligned_byte_offset: 8,
            },
            gfx::InputElementInfo {
                semantic: String::from("COLOR"),
                index: 0,
                format: gfx::Format::RGBA8n,
                input_slot: 0,
                aligned_byte_offset: 16,
            },
        ],
        push_constants: Some(gfx::PushConstantInfo {
            shader_type: gfx::ShaderType::Vertex,
            num_values: 16,
            shader_register: 0,
        }),
        textures: vec![gfx::TextureBindingInfo {
            shader_type: gfx::ShaderType::Fragment,
            shader_register: 0,
        }],
        blend_enabled: true,
        render_target_format,
    })
}

fn create_vertex_buffer<D: Device>(device: &mut D, size: usize) -> Result<D::Buffer, Error> {
    device.create_buffer::<u8>(&gfx::BufferInfo {
        usage: gfx::BufferUsage::Vertex,
        format: gfx::Format::Unknown,
        stride: std::mem::size_of::<ImDrawVert>(),
        num_elements: size,
    }, None)
}

fn create_index_buffer<D: Device>(device: &mut D, size: usize) -> Result<D::Buffer, Error> {
    device.create_buffer::<u8>(&gfx::BufferInfo {
        usage: gfx::BufferUsage::Index,
        format: gfx::Format::R16u,
        stride: std::mem::size_of::<ImDrawIdx>(),
        num_elements: size,
    }, None)
}

fn create_render_buffers<D: Device>(device: &mut D, num_buffers: u32) -> Result<Vec<RenderBuffers<D>>, Error> {
    let mut buffers: Vec<RenderBuffers<D>> = Vec::new();
    for _ in 0..num_buffers {
        buffers.push(RenderBuffers {
            vb: create_vertex_buffer(device, INITIAL_VERTEX_COUNT)?,
            vb_size: INITIAL_VERTEX_COUNT,
            ib: create_index_buffer(device, INITIAL_INDEX_COUNT)?,
            ib_size: INITIAL_INDEX_COUNT,
        });
    }
    Ok(buffers)
}

fn set_key_map(io: &mut ImGuiIO) {
    let map = [
        (ImGuiKey_Tab, vk::TAB),
        (ImGuiKey_LeftArrow, vk::LEFT),
        (ImGuiKey_RightArrow, vk::RIGHT),
        (ImGuiKey_UpArrow, vk::UP),
        (ImGuiKey_DownArrow, vk::DOWN),
        (ImGuiKey_PageUp, vk::PRIOR),
        (ImGuiKey_PageDown, vk::NEXT),
        (ImGuiKey_Home, vk::HOME),
        (ImGuiKey_End, vk::END),
        (ImGuiKey_Insert, vk::INSERT),
        (ImGuiKey_Delete, vk::DELETE),
        (ImGuiKey_Backspace, vk::BACK),
        (ImGuiKey_Space, vk::SPACE),
        (ImGuiKey_Enter, vk::RETURN),
        (ImGuiKey_Escape, vk::ESCAPE),
        (ImGuiKey_KeyPadEnter, os::VK_KEYPAD_ENTER),
        (ImGuiKey_A, 'A' as u32),
        (ImGuiKey_C, 'C' as u32),
        (ImGuiKey_V, 'V' as u32),
        (ImGuiKey_X, 'X' as u32),
        (ImGuiKey_Y, 'Y' as u32),
        (ImGuiKey_Z, 'Z' as u32),
    ];
    for (key, code) in map {
        io.KeyMap[key as usize] = code as i32;
    }
}

impl<D, A> ImGui<D, A> where D: Device, A: os::App {
    pub fn create(info: &mut ImGuiInfo<D, A>) -> Result<Self, Error> {
        let ini_filename = match &info.config.ini_filename {
            Some(name) => Some(
                CString::new(name.as_str()).map_err(|e| Error::Gui(format!("invalid ini filename: {}", e)))?,
            ),
            None => None,
        };
        unsafe {
            let ctx = igCreateContext(std::ptr::null_mut());
            if ctx.is_null() {
                return Err(Error::Gui("failed to create imgui context".to_string()));
            }
            let io = &mut *igGetIO();

            if info.config.nav_keyboard {
                io.ConfigFlags |= ImGuiConfigFlags_NavEnableKeyboard as i32;
            }
            if info.config.docking {
                io.ConfigFlags |= ImGuiConfigFlags_DockingEnable as i32;
            }
            if info.config.viewports {
                io.ConfigFlags |= ImGuiConfigFlags_ViewportsEnable as i32;
            }

            igStyleColorsDark(std::ptr::null_mut());

            // platform windows should look identical to regular ones
            if info.config.viewports {
                let style = &mut *igGetStyle();
                style.WindowRounding = 0.0;
                style.Colors[ImGuiCol_WindowBg as usize].w = 1.0;
            }

            io.IniFilename = ini_filename.as_ref().map_or(std::ptr::null(), |name| name.as_ptr());

            // io setup
            io.BackendPlatformName = b"imgui_impl_nilwindows\0".as_ptr() as *const c_char;
            io.BackendRendererName = b"imgui_impl_nilwindows\0".as_ptr() as *const c_char;
            io.BackendFlags |= ImGuiBackendFlags_RendererHasVtxOffset as i32;
            set_key_map(io);

            let (font_texture, pipeline, buffers) = match Self::create_resources(info) {
                Ok(resources) => resources,
                Err(err) => {
                    igDestroyContext(ctx);
                    return Err(err);
                }
            };

            // the srv slot doubles as the texture id
            if let Some(font_id) = font_texture.get_srv_index() {
                ImFontAtlas_SetTexID(io.Fonts, font_id as ImTextureID);
            }

            let main_handle = info.main_window.get_native_handle().get_isize();
            if info.config.viewports {
                io.BackendFlags |= ImGuiBackendFlags_PlatformHasViewports as i32;
                io.BackendFlags |= ImGuiBackendFlags_RendererHasViewports as i32;
                setup_platform_interface::<D, A>(main_handle);
            }

            log::info!(
                "nilwindows::imgui: created context (docking: {}, viewports: {}, {} buffers)",
                info.config.docking, info.config.viewports, info.num_buffers
            );

            Ok(ImGui {
                ctx,
                ini_filename,
                viewports: info.config.viewports,
                dock_space: info.config.dock_space,
                frame_open: false,
                font_texture,
                pipeline,
                buffers,
                keys_down: [false; 512],
                num_buffers: info.num_buffers,
                render_target_format: info.render_target_format,
                main_handle,
                monitors_dirty: true,
                mouse_window: None,
                _app: std::marker::PhantomData,
            })
        }
    }

    #[allow(clippy::type_complexity)]
    fn create_resources(info: &mut ImGuiInfo<D, A>) -> Result<(D::Texture, D::RenderPipeline, Vec<RenderBuffers<D>>), Error> {
        let buffers = create_render_buffers(info.device, info.num_buffers)?;
        let font_texture = create_fonts_texture(info.device)?;
        if font_texture.get_srv_index().is_none() {
            return Err(Error::Gui("font texture has no shader resource view".to_string()));
        }
        let pipeline = create_render_pipeline(info.device, info.render_target_format)?;
        Ok((font_texture, pipeline, buffers))
    }

    /// Returns true while the context is alive, false after `destroy`
    pub fn is_active(&self) -> bool {
        !self.ctx.is_null()
    }

    /// The font atlas, its shader resource slot is the imgui texture id
    pub fn get_font_texture(&self) -> &D::Texture {
        &self.font_texture
    }

    /// Submit a dock space over the main viewport if enabled in the config
    pub fn is_dock_space_enabled(&self) -> bool {
        self.dock_space
    }

    /// True if imgui sees the key with `code` held, see `os::key_code`
    pub fn is_key_down(&self, code: u32) -> bool {
        if self.ctx.is_null() {
            return false;
        }
        unsafe { (*igGetIO()).KeysDown.get(code as usize).copied().unwrap_or(false) }
    }

    /// True when gui windows may leave the main window in their own platform windows
    pub fn is_viewports_enabled(&self) -> bool {
        self.viewports
    }

    /// `origin` is the screen position of the client area when viewports are enabled, mouse positions are
    /// then reported in screen space
    fn handle_event(&mut self, io: &mut ImGuiIO, event: &Event, window: isize, origin: os::Point<i32>) {
        match *event {
            Event::MouseMove(pos) => {
                io.MousePos = ImVec2 {
                    x: (origin.x + pos.x) as f32,
                    y: (origin.y + pos.y) as f32,
                };
                self.mouse_window = Some(window);
            }
            Event::MouseLeave => {
                if self.mouse_window == Some(window) {
                    io.MousePos = ImVec2 {
                        x: -f32::MAX,
                        y: -f32::MAX,
                    };
                    self.mouse_window = None;
                }
            }
            Event::MouseButton { button, down } => {
                io.MouseDown[button.index()] = down;
            }
            Event::MouseWheel(delta) => io.MouseWheel += delta,
            Event::MouseHWheel(delta) => io.MouseWheelH += delta,
            Event::Key { code, down } => {
                if let Some(key) = self.keys_down.get_mut(code as usize) {
                    *key = down;
                }
            }
            Event::Char(c) => unsafe {
                if c > 0 && c < 0x10000 {
                    ImGuiIO_AddInputCharacterUTF16(io, c as ImWchar16);
                }
            },
            Event::Focus(focused) => unsafe {
                if !focused {
                    self.keys_down = [false; 512];
                    io.MouseDown = [false; 5];
                }
                ImGuiIO_AddFocusEvent(io, focused);
            },
            Event::Resize(_) => self.monitors_dirty = true,
            Event::Close => (),
        }
    }

    fn window_origin(&self, window: &A::Window) -> os::Point<i32> {
        if self.viewports {
            let rect = window.get_window_rect();
            os::Point {
                x: rect.x,
                y: rect.y,
            }
        }
        else {
            os::Point::default()
        }
    }

    /// Refresh the platform window mirrors and feed their events, run before `igNewFrame`
    unsafe fn poll_platform_windows(&mut self, app: &mut A, io: &mut ImGuiIO, main_window: &A::Window) {
        if self.monitors_dirty {
            let mut monitors = app.get_monitors();
            if monitors.is_empty() {
                // imgui requires at least one monitor
                let rect = main_window.get_window_rect();
                monitors.push(os::MonitorInfo {
                    rect,
                    work_rect: rect,
                    primary: true,
                });
            }
            set_monitors(&monitors);
            self.monitors_dirty = false;
        }

        if let Some(data) = viewport_data::<D, A>(igGetMainViewport()) {
            data.read_window(main_window);
        }

        for vp in secondary_viewports() {
            let data = match viewport_data::<D, A>(vp) {
                Some(data) => data,
                None => continue,
            };
            let mut window = match data.window.take() {
                Some(window) => window,
                None => continue,
            };
            window.update(app);
            let handle = window.get_native_handle().get_isize();
            let origin = self.window_origin(&window);
            let events = window.take_events();
            data.read_window(&window);
            data.window = Some(window);
            for event in &events {
                match event {
                    Event::Close => (*vp).PlatformRequestClose = true,
                    Event::Resize(_) => (*vp).PlatformRequestResize = true,
                    _ => self.handle_event(io, event, handle, origin),
                }
            }
        }
    }

    /// Feed display size, delta time and queued events from every platform window then begin a new gui frame
    pub fn new_frame(&mut self, app: &mut A, window: &mut A::Window, dt: f32) {
        if self.ctx.is_null() {
            return;
        }
        let size = window.get_size();
        let handle = window.get_native_handle().get_isize();
        let origin = self.window_origin(window);
        let events = window.take_events();
        unsafe {
            if self.frame_open {
                // a failed frame never reached render
                igEndFrame();
                if self.viewports {
                    igUpdatePlatformWindows();
                }
            }

            let io = &mut *igGetIO();
            io.DisplaySize = ImVec2 {
                x: size.x.max(0) as f32,
                y: size.y.max(0) as f32,
            };
            io.DeltaTime = dt.max(1.0 / 10000.0);

            for event in &events {
                self.handle_event(io, event, handle, origin);
            }

            if self.viewports {
                self.poll_platform_windows(app, io, window);
            }

            io.KeysDown = self.keys_down;
            io.KeyCtrl = self.keys_down[vk::CONTROL as usize];
            io.KeyShift = self.keys_down[vk::SHIFT as usize];
            io.KeyAlt = self.keys_down[vk::MENU as usize];
            io.KeySuper = self.keys_down[vk::LWIN as usize] || self.keys_down[vk::RWIN as usize];

            igNewFrame();
        }
        self.frame_open = true;
    }

    /// Cover the main viewport with a dock space, the central node passes through so the scene stays visible
    pub fn dock_space_over_main_viewport(&self) {
        if self.ctx.is_null() {
            return;
        }
        unsafe {
            igDockSpaceOverViewport(
                igGetMainViewport(),
                ImGuiDockNodeFlags_PassthruCentralNode as i32,
                std::ptr::null(),
            );
        }
    }

    /// Place the next window at `pos`, in screen space when viewports are enabled
    pub fn set_next_window_pos(&self, pos: os::Point<i32>) {
        if self.ctx.is_null() {
            return;
        }
        unsafe {
            igSetNextWindowPos(ImVec2::from(pos), ImGuiCond_Always as i32, ImVec2::default());
        }
    }

    /// A window titled `title` containing a single line of `text`
    pub fn text_window(&self, title: &str, text: &str) -> Result<(), Error> {
        if self.ctx.is_null() {
            return Ok(());
        }
        let title = CString::new(title).map_err(|e| Error::Gui(format!("invalid window title: {}", e)))?;
        let text = CString::new(text).map_err(|e| Error::Gui(format!("invalid text: {}", e)))?;
        unsafe {
            if igBegin(title.as_ptr(), std::ptr::null_mut(), 0) {
                igTextUnformatted(text.as_ptr(), std::ptr::null());
            }
            // End must be called regardless of the Begin result
            igEnd();
        }
        Ok(())
    }

    /// Finalise draw data for this frame and let imgui create or destroy platform windows,
    /// `render` calls this if needed
    pub fn finish_frame(&mut self) {
        if self.frame_open {
            unsafe {
                igRender();
                if self.viewports {
                    igUpdatePlatformWindows();
                }
            }
            self.frame_open = false;
        }
    }

    /// Record the main viewport draw data into `cmd`, the shader heap must already be bound
    pub fn render(&mut self, device: &mut D, cmd: &mut D::CmdBuf) -> Result<(), Error> {
        if self.ctx.is_null() {
            return Ok(());
        }
        self.finish_frame();
        unsafe {
            let draw_data = igGetDrawData();
            if draw_data.is_null() || !(*draw_data).Valid {
                return Ok(());
            }
            render_draw_data(&*draw_data, device, cmd, &mut self.buffers, &self.pipeline)
        }
    }

    /// Create os windows and swap chains for new viewports and apply pending platform requests,
    /// then render and present each visible secondary viewport
    pub fn update_platform_windows(&mut self, app: &mut A, device: &mut D) -> Result<(), Error> {
        if self.ctx.is_null() || !self.viewports {
            return Ok(());
        }
        unsafe {
            let viewports = secondary_viewports();
            for vp in &viewports {
                if let Some(data) = viewport_data::<D, A>(*vp) {
                    self.sync_platform_window(app, device, *vp, data)?;
                }
            }
            for vp in &viewports {
                if (**vp).Flags & ImGuiViewportFlags_Minimized as i32 != 0 {
                    continue;
                }
                if let Some(data) = viewport_data::<D, A>(*vp) {
                    self.render_platform_window(device, *vp, data)?;
                }
            }
        }
        Ok(())
    }

    unsafe fn sync_platform_window(
        &self,
        app: &mut A,
        device: &mut D,
        vp: *mut ImGuiViewport,
        data: &mut ViewportData<D, A>,
    ) -> Result<(), Error> {
        if data.window.is_none() {
            let style = if (*vp).Flags & ImGuiViewportFlags_NoDecoration as i32 != 0 {
                os::WindowStyleFlags::POPUP
            }
            else {
                os::WindowStyleFlags::RESIZABLE
            };
            let window = app.create_window(os::WindowInfo {
                title: data.title.clone(),
                rect: data.rect(),
                style,
                parent_handle: Some(self.main_handle),
            })?;
            data.swap_chain = Some(device.create_swap_chain::<A>(
                &gfx::SwapChainInfo {
                    num_buffers: self.num_buffers,
                    format: self.render_target_format,
                    clear_colour: Some(PLATFORM_WINDOW_CLEAR_COLOUR),
                    vsync: false,
                },
                &window,
            )?);
            data.cmd_buf = Some(device.create_cmd_buf()?);
            data.buffers = create_render_buffers(device, self.num_buffers)?;

            let handle = window.get_native_handle().get_isize() as *mut c_void;
            (*vp).PlatformHandle = handle;
            (*vp).PlatformHandleRaw = handle;
            data.window = Some(window);
            data.rect_dirty = false;
            data.title_dirty = false;
            log::debug!("nilwindows::imgui: created platform window '{}'", data.title);
        }

        let rect = data.rect();
        if let Some(window) = data.window.as_mut() {
            if data.rect_dirty {
                window.set_rect(rect);
                data.rect_dirty = false;
            }
            if data.title_dirty {
                window.set_title(&data.title);
                data.title_dirty = false;
            }
            if let Some(focus) = data.show.take() {
                window.show(focus);
            }
            if data.focus_requested {
                window.bring_to_front();
                data.focus_requested = false;
            }
            window.update(app);
            if let Some(swap_chain) = data.swap_chain.as_mut() {
                swap_chain.update::<A>(device, window)?;
            }
        }
        Ok(())
    }

    unsafe fn render_platform_window(
        &self,
        device: &mut D,
        vp: *mut ImGuiViewport,
        data: &mut ViewportData<D, A>,
    ) -> Result<(), Error> {
        let draw_data = (*vp).DrawData;
        if draw_data.is_null() || !(*draw_data).Valid {
            return Ok(());
        }
        let (swap_chain, cmd) = match (data.swap_chain.as_mut(), data.cmd_buf.as_mut()) {
            (Some(swap_chain), Some(cmd)) => (swap_chain, cmd),
            _ => return Ok(()),
        };

        cmd.reset(swap_chain)?;
        cmd.transition_barrier(&gfx::TransitionBarrier {
            texture: swap_chain.get_backbuffer_texture(),
            state_before: gfx::ResourceState::Present,
            state_after: gfx::ResourceState::RenderTarget,
        });
        cmd.begin_render_target(swap_chain);
        cmd.set_heap(device.get_shader_heap());
        render_draw_data(&*draw_data, device, cmd, &mut data.buffers, &self.pipeline)?;
        cmd.transition_barrier(&gfx::TransitionBarrier {
            texture: swap_chain.get_backbuffer_texture(),
            state_before: gfx::ResourceState::RenderTarget,
            state_after: gfx::ResourceState::Present,
        });
        cmd.close()?;
        device.execute(cmd)?;
        swap_chain.swap(device)
    }

    /// Screen rects of the secondary platform windows
    pub fn get_platform_window_rects(&self) -> Vec<os::Rect<i32>> {
        if self.ctx.is_null() || !self.viewports {
            return Vec::new();
        }
        unsafe {
            secondary_viewports()
                .into_iter()
                .filter_map(|vp| viewport_data::<D, A>(vp))
                .filter_map(|data| data.window.as_ref().map(|window| window.get_window_rect()))
                .collect()
        }
    }

    /// Destroy the context and any platform windows, calling it again does nothing
    pub fn destroy(&mut self) {
        if self.ctx.is_null() {
            return;
        }
        unsafe {
            if self.frame_open {
                igEndFrame();
                self.frame_open = false;
            }
            // platform windows are released through `platform_destroy_window`
            igDestroyContext(self.ctx);
        }
        self.ctx = std::ptr::null_mut();
        // the ini file is written on context destruction so the name is released after
        if let Some(name) = self.ini_filename.take() {
            log::debug!("nilwindows::imgui: saved layout to {}", name.to_string_lossy());
        }
        log::debug!("nilwindows::imgui: destroyed context");
    }
}

fn render_draw_data<D: Device>(
    draw_data: &ImDrawData,
    device: &mut D,
    cmd: &mut D::CmdBuf,
    buffers: &mut [RenderBuffers<D>],
    pipeline: &D::RenderPipeline,
) -> Result<(), Error> {
    // minimised
    if draw_data.DisplaySize.x <= 0.0 || draw_data.DisplaySize.y <= 0.0 || draw_data.CmdListsCount == 0 {
        return Ok(());
    }

    unsafe {
        let bb = cmd.get_backbuffer_index() as usize;
        let buffers = buffers
            .get_mut(bb)
            .ok_or_else(|| Error::Gui(format!("no render buffers for back buffer {}", bb)))?;

        // grow with headroom so buffers are not re-created every frame
        let total_vtx = draw_data.TotalVtxCount as usize;
        if total_vtx > buffers.vb_size {
            buffers.vb_size = total_vtx + INITIAL_VERTEX_COUNT;
            buffers.vb = create_vertex_buffer(device, buffers.vb_size)?;
            log::debug!("nilwindows::imgui: vertex buffer {} grown to {}", bb, buffers.vb_size);
        }

        let total_idx = draw_data.TotalIdxCount as usize;
        if total_idx > buffers.ib_size {
            buffers.ib_size = total_idx + INITIAL_INDEX_COUNT;
            buffers.ib = create_index_buffer(device, buffers.ib_size)?;
            log::debug!("nilwindows::imgui: index buffer {} grown to {}", bb, buffers.ib_size);
        }

        // update buffers
        let imgui_cmd_lists = std::slice::from_raw_parts(draw_data.CmdLists, draw_data.CmdListsCount as usize);
        let mut vertex_write_offset = 0;
        let mut index_write_offset = 0;

        for imgui_cmd_list in imgui_cmd_lists {
            let draw_vert = &(**imgui_cmd_list).VtxBuffer;
            if draw_vert.Size > 0 {
                let vb_slice = std::slice::from_raw_parts(draw_vert.Data, draw_vert.Size as usize);
                buffers.vb.update(vertex_write_offset, vb_slice)?;
                vertex_write_offset += std::mem::size_of_val(vb_slice);
            }

            let draw_index = &(**imgui_cmd_list).IdxBuffer;
            if draw_index.Size > 0 {
                let ib_slice = std::slice::from_raw_parts(draw_index.Data, draw_index.Size as usize);
                buffers.ib.update(index_write_offset, ib_slice)?;
                index_write_offset += std::mem::size_of_val(ib_slice);
            }
        }

        // orthographic projection over the display rect
        let l = draw_data.DisplayPos.x;
        let r = draw_data.DisplayPos.x + draw_data.DisplaySize.x;
        let t = draw_data.DisplayPos.y;
        let b = draw_data.DisplayPos.y + draw_data.DisplaySize.y;

        let mvp: [[f32; 4]; 4] = [
            [2.0 / (r - l), 0.0, 0.0, 0.0],
            [0.0, 2.0 / (t - b), 0.0, 0.0],
            [0.0, 0.0, 0.5, 0.0],
            [(r + l) / (l - r), (t + b) / (b - t), 0.0, 1.0],
        ];

        let viewport = gfx::Viewport {
            x: 0.0,
            y: 0.0,
            width: draw_data.DisplaySize.x,
            height: draw_data.DisplaySize.y,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        cmd.set_viewport(&viewport);
        cmd.set_vertex_buffer(&buffers.vb, 0);
        cmd.set_index_buffer(&buffers.ib);
        cmd.set_render_pipeline(pipeline);
        cmd.push_constants(0, 16, 0, &mvp);

        let clip_off = draw_data.DisplayPos;
        let mut global_vtx_offset = 0;
        let mut global_idx_offset = 0;
        for imgui_cmd_list in imgui_cmd_lists {
            let imgui_cmd_buffer = &(**imgui_cmd_list).CmdBuffer;
            let imgui_cmd_data = std::slice::from_raw_parts(imgui_cmd_buffer.Data, imgui_cmd_buffer.Size as usize);
            for imgui_cmd in imgui_cmd_data {
                // no user callbacks are registered
                if imgui_cmd.UserCallback.is_some() {
                    continue;
                }

                let clip_min_x = imgui_cmd.ClipRect.x - clip_off.x;
                let clip_min_y = imgui_cmd.ClipRect.y - clip_off.y;
                let clip_max_x = imgui_cmd.ClipRect.z - clip_off.x;
                let clip_max_y = imgui_cmd.ClipRect.w - clip_off.y;
                if clip_max_x <= clip_min_x || clip_max_y <= clip_min_y {
                    continue;
                }

                let scissor = gfx::ScissorRect {
                    left: clip_min_x as i32,
                    top: clip_min_y as i32,
                    right: clip_max_x as i32,
                    bottom: clip_max_y as i32,
                };

                cmd.set_render_heap(1, device.get_shader_heap(), imgui_cmd.TextureId as usize);
                cmd.set_scissor_rect(&scissor);
                cmd.draw_indexed_instanced(
                    imgui_cmd.ElemCount,
                    1,
                    imgui_cmd.IdxOffset + global_idx_offset,
                    (imgui_cmd.VtxOffset + global_vtx_offset) as i32,
                    0,
                );
            }
            global_idx_offset += (**imgui_cmd_list).IdxBuffer.Size as u32;
            global_vtx_offset += (**imgui_cmd_list).VtxBuffer.Size as u32;
        }
    }
    Ok(())
}

unsafe fn viewport_data<'a, D: Device, A: os::App>(vp: *mut ImGuiViewport) -> Option<&'a mut ViewportData<D, A>> {
    if vp.is_null() {
        return None;
    }
    ((*vp).PlatformUserData as *mut ViewportData<D, A>).as_mut()
}

/// Every viewport except the main one
unsafe fn secondary_viewports() -> Vec<*mut ImGuiViewport> {
    let platform_io = &*igGetPlatformIO();
    if platform_io.Viewports.Data.is_null() || platform_io.Viewports.Size <= 1 {
        return Vec::new();
    }
    std::slice::from_raw_parts(platform_io.Viewports.Data, platform_io.Viewports.Size as usize)[1..].to_vec()
}

/// Replace the platform monitor list, the vector memory is owned by imgui and freed on shutdown
unsafe fn set_monitors(monitors: &[os::MonitorInfo]) {
    let platform_io = &mut *igGetPlatformIO();
    let count = monitors.len();
    let data = igMemAlloc(count * std::mem::size_of::<ImGuiPlatformMonitor>()) as *mut ImGuiPlatformMonitor;
    if data.is_null() {
        return;
    }
    std::ptr::write_bytes(data, 0, count);
    for (i, monitor) in monitors.iter().enumerate() {
        let dst = &mut *data.add(i);
        dst.MainPos = ImVec2::from(os::Point {
            x: monitor.rect.x,
            y: monitor.rect.y,
        });
        dst.MainSize = ImVec2 {
            x: monitor.rect.width as f32,
            y: monitor.rect.height as f32,
        };
        dst.WorkPos = ImVec2::from(os::Point {
            x: monitor.work_rect.x,
            y: monitor.work_rect.y,
        });
        dst.WorkSize = ImVec2 {
            x: monitor.work_rect.width as f32,
            y: monitor.work_rect.height as f32,
        };
        dst.DpiScale = 1.0;
    }
    if !platform_io.Monitors.Data.is_null() {
        igMemFree(platform_io.Monitors.Data as *mut c_void);
    }
    platform_io.Monitors.Data = data;
    platform_io.Monitors.Size = count as i32;
    platform_io.Monitors.Capacity = count as i32;
}

unsafe fn setup_platform_interface<D: Device, A: os::App>(main_handle: isize) {
    let platform_io = &mut *igGetPlatformIO();
    platform_io.Platform_CreateWindow = Some(platform_create_window::<D, A>);
    platform_io.Platform_DestroyWindow = Some(platform_destroy_window::<D, A>);
    platform_io.Platform_ShowWindow = Some(platform_show_window::<D, A>);
    platform_io.Platform_SetWindowPos = Some(platform_set_window_pos::<D, A>);
    platform_io.Platform_GetWindowPos = Some(platform_get_window_pos::<D, A>);
    platform_io.Platform_SetWindowSize = Some(platform_set_window_size::<D, A>);
    platform_io.Platform_GetWindowSize = Some(platform_get_window_size::<D, A>);
    platform_io.Platform_SetWindowFocus = Some(platform_set_window_focus::<D, A>);
    platform_io.Platform_GetWindowFocus = Some(platform_get_window_focus::<D, A>);
    platform_io.Platform_GetWindowMinimized = Some(platform_get_window_minimised::<D, A>);
    platform_io.Platform_SetWindowTitle = Some(platform_set_window_title::<D, A>);

    // the main viewport mirrors the client window, it never owns one
    let main_viewport = igGetMainViewport();
    let data: Box<ViewportData<D, A>> = Box::new(ViewportData::new(ImVec2::default(), ImVec2::default()));
    (*main_viewport).PlatformUserData = Box::into_raw(data) as *mut c_void;
    (*main_viewport).PlatformHandle = main_handle as *mut c_void;
    (*main_viewport).PlatformHandleRaw = main_handle as *mut c_void;
}

unsafe extern "C" fn platform_create_window<D: Device, A: os::App>(vp: *mut ImGuiViewport) {
    if vp.is_null() {
        return;
    }
    let data: Box<ViewportData<D, A>> = Box::new(ViewportData::new((*vp).Pos, (*vp).Size));
    (*vp).PlatformUserData = Box::into_raw(data) as *mut c_void;
}

unsafe extern "C" fn platform_destroy_window<D: Device, A: os::App>(vp: *mut ImGuiViewport) {
    if vp.is_null() {
        return;
    }
    let data = (*vp).PlatformUserData as *mut ViewportData<D, A>;
    if !data.is_null() {
        // drops the swap chain before the window
        drop(Box::from_raw(data));
    }
    (*vp).PlatformUserData = std::ptr::null_mut();
    (*vp).PlatformHandle = std::ptr::null_mut();
    (*vp).PlatformHandleRaw = std::ptr::null_mut();
}

unsafe extern "C" fn platform_show_window<D: Device, A: os::App>(vp: *mut ImGuiViewport) {
    if let Some(data) = viewport_data::<D, A>(vp) {
        data.show = Some((*vp).Flags & ImGuiViewportFlags_NoFocusOnAppearing as i32 == 0);
    }
}

unsafe extern "C" fn platform_set_window_pos<D: Device, A: os::App>(vp: *mut ImGuiViewport, pos: ImVec2) {
    if let Some(data) = viewport_data::<D, A>(vp) {
        data.pos = pos;
        data.rect_dirty = true;
    }
}

unsafe extern "C" fn platform_get_window_pos<D: Device, A: os::App>(vp: *mut ImGuiViewport) -> ImVec2 {
    viewport_data::<D, A>(vp).map_or(ImVec2::default(), |data| data.pos)
}

unsafe extern "C" fn platform_set_window_size<D: Device, A: os::App>(vp: *mut ImGuiViewport, size: ImVec2) {
    if let Some(data) = viewport_data::<D, A>(vp) {
        data.size = size;
        data.rect_dirty = true;
    }
}

unsafe extern "C" fn platform_get_window_size<D: Device, A: os::App>(vp: *mut ImGuiViewport) -> ImVec2 {
    viewport_data::<D, A>(vp).map_or(ImVec2::default(), |data| data.size)
}

unsafe extern "C" fn platform_set_window_focus<D: Device, A: os::App>(vp: *mut ImGuiViewport) {
    if let Some(data) = viewport_data::<D, A>(vp) {
        data.focus_requested = true;
    }
}

unsafe extern "C" fn platform_get_window_focus<D: Device, A: os::App>(vp: *mut ImGuiViewport) -> bool {
    viewport_data::<D, A>(vp).map_or(false, |data| data.focused)
}

unsafe extern "C" fn platform_get_window_minimised<D: Device, A: os::App>(vp: *mut ImGuiViewport) -> bool {
    viewport_data::<D, A>(vp).map_or(false, |data| data.minimised)
}

unsafe extern "C" fn platform_set_window_title<D: Device, A: os::App>(vp: *mut ImGuiViewport, title: *const c_char) {
    if title.is_null() {
        return;
    }
    if let Some(data) = viewport_data::<D, A>(vp) {
        data.title = CStr::from_ptr(title).to_string_lossy().into_owned();
        data.title_dirty = true;
    }
}

impl<D, A> Drop for ImGui<D, A> where D: Device, A: os::App {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl From<os::Point<i32>> for ImVec2 {
    fn from(point: os::Point<i32>) -> ImVec2 {
        ImVec2 {
            x: point.x as f32,
            y: point.y as f32,
        }
    }
}
