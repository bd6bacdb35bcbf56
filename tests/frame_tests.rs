// frame lifecycle on the headless device and app, runs on any host
use nilwindows::prelude::*;
use nilwindows::gfx::null;
use nilwindows::os::null as os_null;
use nilwindows::gfx::Heap;

use std::sync::Mutex;

// imgui keeps a single global context
static IMGUI_LOCK: Mutex<()> = Mutex::new(());

type NullRenderer = Renderer<null::Device, os_null::App>;

fn test_config() -> Config {
    let mut config = Config::default();
    config.debug_layer = false;
    config.gui.ini_filename = None;
    config
}

fn create_app_and_window(config: &Config) -> (os_null::App, os_null::Window) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut app = os_null::App::create(os::AppInfo {
        name: String::from("frame_tests"),
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
fn backbuffer_index_rotates() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut config = test_config();
    config.num_buffers = 3;
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    assert_eq!(renderer.get_swap_chain().get_backbuffer_index(), 0);
    let mut indices = Vec::new();
    for _ in 0..6 {
        renderer.render(&mut app, &mut window).unwrap();
        let bb = renderer.get_swap_chain().get_backbuffer_index();
        assert!(bb < 3);
        indices.push(bb);
    }
    assert_eq!(indices, vec![1, 2, 0, 1, 2, 0]);
}

#[test]
fn fence_is_complete_after_each_frame() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    let mut last_value = renderer.get_swap_chain().get_fence_value();
    for _ in 0..4 {
        renderer.render(&mut app, &mut window).unwrap();
        let swap_chain = renderer.get_swap_chain();
        assert_eq!(swap_chain.get_fence_value(), last_value + 1);
        assert!(swap_chain.get_completed_fence_value() >= swap_chain.get_fence_value());
        last_value = swap_chain.get_fence_value();
    }
}

#[test]
fn each_render_presents_once() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    for _ in 0..5 {
        renderer.render(&mut app, &mut window).unwrap();
    }
    let stats = renderer.get_device().get_stats();
    assert_eq!(stats.presents, 5);
    assert_eq!(stats.executes, 5);
    assert_eq!(stats.fence_waits, 5);
    assert_eq!(renderer.get_swap_chain().get_fence_value(), 5);
    assert_eq!(renderer.get_frame_count(), 5);
}

#[test]
fn destroy_closes_event_once() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    renderer.render(&mut app, &mut window).unwrap();
    renderer.destroy().unwrap();
    renderer.destroy().unwrap();
    assert!(renderer.is_destroyed());
    assert!(!renderer.get_imgui().is_active());
    assert_eq!(renderer.get_device().get_stats().event_closes, 1);

    // rendering after shutdown is a fatal error
    let err = renderer.render(&mut app, &mut window).unwrap_err();
    assert!(!err.is_recoverable());
}

#[test]
fn frame_records_triangle_and_gui() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    // new auto sized windows are hidden for their first frame
    renderer.render(&mut app, &mut window).unwrap();
    renderer.render(&mut app, &mut window).unwrap();

    let cmd = renderer.get_cmd_buf();
    assert_eq!(cmd.get_transitions(), &[
        (gfx::ResourceState::Present, gfx::ResourceState::RenderTarget),
        (gfx::ResourceState::RenderTarget, gfx::ResourceState::Present),
    ]);
    assert_eq!(cmd.get_cleared(), Some(config.clear_colour));
    assert!(cmd.is_heap_bound());
    assert!(cmd.is_pipeline_bound());

    let draws = cmd.get_draws();
    assert_eq!(draws[0], null::DrawCall {
        count: 3,
        instance_count: 1,
        indexed: false,
    });
    // the hello window produces at least one indexed gui draw
    assert!(draws.iter().any(|d| d.indexed && d.count > 0));
}

#[test]
fn triangle_can_be_disabled() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut config = test_config();
    config.draw_triangle = false;
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    renderer.render(&mut app, &mut window).unwrap();
    assert!(renderer.get_cmd_buf().get_draws().iter().all(|d| d.indexed));
    assert_eq!(renderer.get_device().get_stats().presents, 1);
}

#[test]
fn dock_space_frame_renders() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut config = test_config();
    config.gui.dock_space = true;
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    assert!(renderer.get_imgui().is_dock_space_enabled());
    for _ in 0..2 {
        renderer.render(&mut app, &mut window).unwrap();
    }
    assert_eq!(renderer.get_frame_count(), 2);
}

#[test]
fn resize_recreates_buffers_once_per_size() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    renderer.render(&mut app, &mut window).unwrap();
    assert_eq!(renderer.get_device().get_stats().resizes, 0);

    window.set_size(640, 480);
    renderer.render(&mut app, &mut window).unwrap();
    renderer.render(&mut app, &mut window).unwrap();
    assert_eq!(renderer.get_device().get_stats().resizes, 1);
    assert_eq!(renderer.get_swap_chain().get_size(), (640, 480));

    window.set_size(800, 600);
    renderer.render(&mut app, &mut window).unwrap();
    assert_eq!(renderer.get_device().get_stats().resizes, 2);
}

#[test]
fn minimised_window_keeps_buffers() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    window.set_size(0, 0);
    renderer.render(&mut app, &mut window).unwrap();
    assert_eq!(renderer.get_device().get_stats().resizes, 0);
    assert_eq!(renderer.get_swap_chain().get_size(), (1280, 720));
    // no triangle into an empty viewport
    assert!(renderer.get_cmd_buf().get_draws().iter().all(|d| d.indexed));
}

#[test]
fn input_events_are_consumed_by_gui() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    window.push_event(os::Event::MouseMove(os::Point { x: 100, y: 100 }));
    window.push_event(os::Event::MouseButton {
        button: os::MouseButton::Left,
        down: true,
    });
    window.push_event(os::Event::MouseWheel(1.0));
    window.push_event(os::Event::Key { code: 0x11, down: true });
    window.push_event(os::Event::Char('a' as u32));
    renderer.render(&mut app, &mut window).unwrap();
    assert!(window.take_events().is_empty());

    window.push_event(os::Event::MouseButton {
        button: os::MouseButton::Left,
        down: false,
    });
    window.push_event(os::Event::Focus(false));
    window.push_event(os::Event::MouseLeave);
    renderer.render(&mut app, &mut window).unwrap();
    assert!(!window.is_focused());
    assert_eq!(renderer.get_frame_count(), 2);
}

#[test]
fn device_loss_is_recoverable() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    renderer.get_device().simulate_device_lost();
    let err = renderer.render(&mut app, &mut window).unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(err, Error::DeviceLost(_)));
}

#[test]
fn shader_heap_exhaustion_is_an_error() {
    let mut device = null::Device::create(&gfx::DeviceInfo {
        adapter_name: None,
        shader_heap_size: 1,
        debug_layer: false,
    }).unwrap();

    let info = gfx::TextureInfo {
        width: 4,
        height: 4,
        format: gfx::Format::RGBA8n,
        usage: gfx::TextureUsage::SHADER_RESOURCE,
    };
    let first = device.create_texture::<u8>(&info, None).unwrap();
    assert_eq!(first.get_srv_index(), Some(0));
    assert_eq!(device.get_shader_heap().get_num_allocated(), 1);

    assert!(matches!(device.create_texture::<u8>(&info, None), Err(Error::Heap(_))));

    // textures without a view do not need a slot
    let plain = device.create_texture::<u8>(&gfx::TextureInfo {
        usage: gfx::TextureUsage::NONE,
        ..info
    }, None).unwrap();
    assert_eq!(plain.get_srv_index(), None);
}

#[test]
fn gui_needs_a_heap_slot() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut config = test_config();
    let (_app, window) = create_app_and_window(&config);

    // one slot for the font atlas is enough
    config.shader_heap_size = 1;
    let renderer = NullRenderer::create(&config, &window).unwrap();
    assert_eq!(renderer.get_device().get_shader_heap().get_num_allocated(), 1);
    assert_eq!(renderer.get_imgui().get_font_texture().get_srv_index(), Some(0));
    drop(renderer);

    config.shader_heap_size = 0;
    assert!(matches!(NullRenderer::create(&config, &window), Err(Error::Heap(_))));
}

#[test]
fn reset_requires_completed_fence() {
    let config = test_config();
    let (_app, window) = create_app_and_window(&config);
    let mut device = null::Device::create(&gfx::DeviceInfo {
        adapter_name: None,
        shader_heap_size: 1,
        debug_layer: false,
    }).unwrap();
    let mut swap_chain = device.create_swap_chain::<os_null::App>(&gfx::SwapChainInfo {
        num_buffers: 2,
        format: gfx::Format::RGBA8n,
        clear_colour: None,
        vsync: true,
    }, &window).unwrap();
    let mut cmd = device.create_cmd_buf().unwrap();

    // executing while still recording is rejected
    cmd.reset(&swap_chain).unwrap();
    assert!(device.execute(&cmd).is_err());
    cmd.close().unwrap();
    assert!(cmd.close().is_err());
    device.execute(&cmd).unwrap();

    swap_chain.swap(&device).unwrap();
    assert_eq!(swap_chain.get_completed_fence_value(), 1);
    cmd.reset(&swap_chain).unwrap();
    assert_eq!(cmd.get_backbuffer_index(), 1);
    cmd.close().unwrap();

    swap_chain.destroy().unwrap();
    swap_chain.destroy().unwrap();
    assert_eq!(device.get_stats().event_closes, 1);
}

type NullGui = imgui::ImGui<null::Device, os_null::App>;

fn gui_frame(gui: &mut NullGui, app: &mut os_null::App, window: &mut os_null::Window, device: &mut null::Device, outside: Option<os::Point<i32>>) {
    gui.new_frame(app, window, 1.0 / 60.0);
    if let Some(pos) = outside {
        gui.set_next_window_pos(pos);
        gui.text_window("Outside", "outside the main window").unwrap();
    }
    gui.finish_frame();
    gui.update_platform_windows(app, device).unwrap();
}

#[test]
fn gui_window_outside_main_window_gets_own_platform_window() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    assert!(config.gui.viewports);
    let (mut app, mut window) = create_app_and_window(&config);
    let mut device = null::Device::create(&gfx::DeviceInfo {
        adapter_name: None,
        shader_heap_size: 1,
        debug_layer: false,
    }).unwrap();
    let mut gui = NullGui::create(&mut imgui::ImGuiInfo {
        device: &mut device,
        main_window: &window,
        num_buffers: 2,
        render_target_format: gfx::Format::RGBA8n,
        config: &config.gui,
    }).unwrap();
    assert!(gui.is_viewports_enabled());

    // the main window covers 100..1380, the monitor is 1920 wide
    let outside = os::Point { x: 1500, y: 200 };
    for _ in 0..3 {
        gui_frame(&mut gui, &mut app, &mut window, &mut device, Some(outside));
    }
    let rects = gui.get_platform_window_rects();
    assert_eq!(rects.len(), 1);
    assert_eq!((rects[0].x, rects[0].y), (1500, 200));
    assert!(rects[0].width > 0 && rects[0].height > 0);

    // the platform window has its own swap chain which presents every frame
    let presents = device.get_stats().presents;
    assert!(presents >= 1);
    gui_frame(&mut gui, &mut app, &mut window, &mut device, Some(outside));
    assert_eq!(device.get_stats().presents, presents + 1);
    assert_eq!(device.get_stats().fence_waits, presents + 1);

    // no longer submitted, the platform window goes away
    for _ in 0..2 {
        gui_frame(&mut gui, &mut app, &mut window, &mut device, None);
    }
    assert!(gui.get_platform_window_rects().is_empty());
    assert_eq!(device.get_stats().event_closes, 1);

    gui.destroy();
    assert!(!gui.is_active());
}

#[test]
fn gui_window_inside_main_window_stays_in_main_viewport() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut device = null::Device::create(&gfx::DeviceInfo {
        adapter_name: None,
        shader_heap_size: 1,
        debug_layer: false,
    }).unwrap();
    let mut gui = NullGui::create(&mut imgui::ImGuiInfo {
        device: &mut device,
        main_window: &window,
        num_buffers: 2,
        render_target_format: gfx::Format::RGBA8n,
        config: &config.gui,
    }).unwrap();

    for _ in 0..3 {
        gui_frame(&mut gui, &mut app, &mut window, &mut device, Some(os::Point { x: 200, y: 200 }));
    }
    assert!(gui.get_platform_window_rects().is_empty());
    assert_eq!(device.get_stats().presents, 0);
}

#[test]
fn viewports_can_be_disabled() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut config = test_config();
    config.gui.viewports = false;
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();
    assert!(!renderer.get_imgui().is_viewports_enabled());

    window.push_event(os::Event::MouseMove(os::Point { x: 10, y: 10 }));
    for _ in 0..2 {
        renderer.render(&mut app, &mut window).unwrap();
    }
    assert!(renderer.get_imgui().get_platform_window_rects().is_empty());
    assert_eq!(renderer.get_device().get_stats().presents, 2);
}

#[test]
fn keypad_enter_reaches_the_gui() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let config = test_config();
    let (mut app, mut window) = create_app_and_window(&config);
    let mut renderer = NullRenderer::create(&config, &window).unwrap();

    window.push_event(os::Event::Key {
        code: os::key_code(0x0d, true),
        down: true,
    });
    renderer.render(&mut app, &mut window).unwrap();
    assert!(renderer.get_imgui().is_key_down(os::VK_KEYPAD_ENTER));
    assert!(!renderer.get_imgui().is_key_down(0x0d));
}
