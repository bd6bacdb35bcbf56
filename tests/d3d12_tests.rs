// windows only because here we need a concrete gfx and os implementation
#![cfg(target_os = "windows")]

use nilwindows::prelude::*;
use nilwindows::gfx::Heap;

use std::sync::Mutex;

// imgui keeps a single global context
static IMGUI_LOCK: Mutex<()> = Mutex::new(());

fn test_config(name: &str) -> Config {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = Config::default();
    config.title = String::from(name);
    config.window_rect = os::Rect {
        x: 0,
        y: 0,
        width: 640,
        height: 480,
    };
    config.gui.ini_filename = None;
    config
}

fn create_app_and_window(config: &Config) -> (os_platform::App, os_platform::Window) {
    let mut app = os_platform::App::create(os::AppInfo {
        name: config.title.clone(),
        max_frames: None,
    }).unwrap();
    let window = app.create_window(os::WindowInfo {
        title: config.title.clone(),
        rect: config.window_rect,
        style: config.window_style(),
        parent_handle: None,
    }).unwrap();
    (app, window)
}

#[test]
fn create_d3d12_device() {
    let device = gfx_platform::Device::create(&gfx::DeviceInfo {
        adapter_name: None,
        shader_heap_size: 4,
        debug_layer: false,
    }).unwrap();
    let adapter_info = device.get_adapter_info();
    assert!(!adapter_info.description.is_empty());
    assert!(!adapter_info.available.is_empty());
    assert_eq!(device.get_shader_heap().get_capacity(), 4);
}

#[test]
fn unknown_adapter_name_falls_back() {
    let device = gfx_platform::Device::create(&gfx::DeviceInfo {
        adapter_name: Some(String::from("no such adapter")),
        shader_heap_size: 1,
        debug_layer: false,
    }).unwrap();
    assert_eq!(device.get_adapter_info().description, device.get_adapter_info().available[0]);
}

#[test]
fn create_window() {
    let config = test_config("create_window");
    let (_app, win) = create_app_and_window(&config);
    win.bring_to_front();
    let size = win.get_size();
    assert_eq!(size, os::Size { x: 640, y: 480 });
    assert_eq!(win.get_viewport_rect().width, 640);
}

#[test]
fn render_one_frame_and_destroy() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config("render_one_frame_and_destroy");
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = Renderer::<gfx_platform::Device, os_platform::App>::create(&config, &window).unwrap();

    assert!(app.run());
    renderer.render(&mut app, &mut window).unwrap();

    let swap_chain = renderer.get_swap_chain();
    assert_eq!(swap_chain.get_fence_value(), 1);
    assert!(swap_chain.get_completed_fence_value() >= 1);
    assert!(swap_chain.get_backbuffer_index() < config.num_buffers);

    renderer.destroy().unwrap();
    renderer.destroy().unwrap();
    assert!(renderer.is_destroyed());
}

#[test]
fn backbuffer_index_stays_in_range() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut config = test_config("backbuffer_index_stays_in_range");
    config.num_buffers = 3;
    config.vsync = false;
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = Renderer::<gfx_platform::Device, os_platform::App>::create(&config, &window).unwrap();

    for i in 0..6 {
        app.run();
        renderer.render(&mut app, &mut window).unwrap();
        assert!(renderer.get_swap_chain().get_backbuffer_index() < 3);
        assert_eq!(renderer.get_swap_chain().get_fence_value(), i + 1);
    }
}

#[test]
fn shader_heap_exhaustion_is_an_error() {
    let mut device = gfx_platform::Device::create(&gfx::DeviceInfo {
        adapter_name: None,
        shader_heap_size: 1,
        debug_layer: false,
    }).unwrap();

    let pixels = vec![0xffu8; 4 * 4 * 4];
    let info = gfx::TextureInfo {
        width: 4,
        height: 4,
        format: gfx::Format::RGBA8n,
        usage: gfx::TextureUsage::SHADER_RESOURCE,
    };
    let tex = device.create_texture(&info, Some(pixels.as_slice())).unwrap();
    assert_eq!(tex.get_srv_index(), Some(0));

    assert!(matches!(device.create_texture(&info, Some(pixels.as_slice())), Err(Error::Heap(_))));
}

#[test]
fn client_runs_until_quit() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config("client_runs_until_quit");
    let mut client = Client::<gfx_platform::Device, os_platform::App>::create(config.into()).unwrap();
    assert!(client.update().unwrap());
    client.request_quit();
    client.run().unwrap();
    assert!(client.get_renderer().is_destroyed());
    assert_eq!(client.get_device_resets(), 0);
}

#[test]
fn gui_window_outside_main_window_opens_platform_window() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config("gui_window_outside_main_window_opens_platform_window");
    let (mut app, mut window) = create_app_and_window(&config);
    let mut device = gfx_platform::Device::create(&gfx::DeviceInfo {
        adapter_name: None,
        shader_heap_size: 1,
        debug_layer: false,
    }).unwrap();
    let mut gui = imgui::ImGui::<gfx_platform::Device, os_platform::App>::create(&mut imgui::ImGuiInfo {
        device: &mut device,
        main_window: &window,
        num_buffers: 2,
        render_target_format: gfx::Format::RGBA8n,
        config: &config.gui,
    }).unwrap();
    assert!(!app.get_monitors().is_empty());

    let client = window.get_window_rect();
    let outside = os::Point {
        x: client.x + client.width + 20,
        y: client.y,
    };
    for _ in 0..3 {
        app.run();
        window.update(&mut app);
        gui.new_frame(&mut app, &mut window, 1.0 / 60.0);
        gui.set_next_window_pos(outside);
        gui.text_window("Outside", "outside the main window").unwrap();
        gui.finish_frame();
        gui.update_platform_windows(&mut app, &mut device).unwrap();
    }
    let rects = gui.get_platform_window_rects();
    assert_eq!(rects.len(), 1);
    assert_eq!((rects[0].x, rects[0].y), (outside.x, outside.y));

    // closing the popup must not quit the app
    gui.destroy();
    assert!(app.run());
}
