// message pump and device loss recovery on the headless device and app
use nilwindows::prelude::*;
use nilwindows::client::{ClientInfo, MAX_DEVICE_RESETS};
use nilwindows::gfx::null;
use nilwindows::os::null as os_null;

use std::sync::Mutex;

// imgui keeps a single global context
static IMGUI_LOCK: Mutex<()> = Mutex::new(());

type NullClient = Client<null::Device, os_null::App>;

fn client_info(max_frames: Option<usize>) -> ClientInfo {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = Config::default();
    config.debug_layer = false;
    config.gui.ini_filename = None;
    ClientInfo {
        config,
        max_frames,
    }
}

#[test]
fn run_stops_after_quit() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut client = NullClient::create(client_info(Some(4))).unwrap();
    client.run().unwrap();

    let renderer = client.get_renderer();
    assert_eq!(renderer.get_frame_count(), 4);
    assert!(renderer.is_destroyed());
    let stats = renderer.get_device().get_stats();
    assert_eq!(stats.presents, 4);
    assert_eq!(stats.event_closes, 1);
    assert_eq!(client.app.get_frame(), 4);
}

#[test]
fn update_returns_false_after_request_quit() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut client = NullClient::create(client_info(None)).unwrap();
    assert!(client.update().unwrap());
    assert!(client.update().unwrap());
    client.request_quit();
    assert!(!client.update().unwrap());
    assert_eq!(client.get_renderer().get_frame_count(), 2);
}

#[test]
fn window_uses_config() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut info = client_info(Some(1));
    info.config.title = String::from("client_tests");
    info.config.window_rect = os::Rect {
        x: 0,
        y: 0,
        width: 320,
        height: 240,
    };
    let client = NullClient::create(info).unwrap();
    assert_eq!(client.main_window.get_title(), "client_tests");
    assert_eq!(client.get_window_size(), os::Size { x: 320, y: 240 });
    assert_eq!(client.get_config().window_rect.width, 320);
}

#[test]
fn device_loss_recreates_renderer() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut client = NullClient::create(client_info(None)).unwrap();
    assert!(client.update().unwrap());
    assert_eq!(client.get_renderer().get_frame_count(), 1);

    client.get_renderer().get_device().simulate_device_lost();
    assert!(client.update().unwrap());
    assert_eq!(client.get_device_resets(), 1);

    // the new renderer starts from a fresh device
    assert_eq!(client.get_renderer().get_frame_count(), 0);
    assert!(client.get_renderer().get_imgui().is_active());
    assert!(client.update().unwrap());
    assert_eq!(client.get_renderer().get_frame_count(), 1);
    assert_eq!(client.get_renderer().get_device().get_stats().presents, 1);
}

#[test]
fn repeated_device_loss_gives_up() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut client = NullClient::create(client_info(None)).unwrap();
    for _ in 0..MAX_DEVICE_RESETS {
        client.get_renderer().get_device().simulate_device_lost();
        assert!(client.update().unwrap());
    }
    assert_eq!(client.get_device_resets(), MAX_DEVICE_RESETS);

    client.get_renderer().get_device().simulate_device_lost();
    let err = client.update().unwrap_err();
    assert!(matches!(err, Error::DeviceLost(_)));
}

#[test]
fn resize_is_picked_up_by_the_pump() {
    let _lock = IMGUI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut client = NullClient::create(client_info(None)).unwrap();
    assert!(client.update().unwrap());
    client.main_window.set_size(800, 600);
    assert!(client.update().unwrap());
    assert!(client.update().unwrap());
    assert_eq!(client.get_renderer().get_device().get_stats().resizes, 1);
    assert_eq!(client.get_renderer().get_swap_chain().get_size(), (800, 600));
}

#[test]
fn invalid_config_is_rejected() {
    let mut info = client_info(Some(1));
    info.config.num_buffers = 1;
    assert!(matches!(NullClient::create(info), Err(Error::Config(_))));

    let mut info = client_info(Some(1));
    info.config.shader_heap_size = 0;
    assert!(matches!(NullClient::create(info), Err(Error::Config(_))));
}
