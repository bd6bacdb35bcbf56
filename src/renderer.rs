use crate::config::Config;
use crate::gfx;
use crate::gfx::{CmdBuf, Device, SwapChain};
use crate::imgui;
use crate::os;
use crate::os::Window;
use crate::Error;

use std::time::Instant;

/// Vertex layout of the hard coded triangle
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub colour: [f32; 4],
}

const TRIANGLE_SHADER_SOURCE: &str = "
    struct PSInput
    {
        float4 position : SV_POSITION;
        float4 color : COLOR;
    };

    PSInput VSMain(float4 position : POSITION, float4 color : COLOR)
    {
        PSInput result;
        result.position = position;
        result.color = color;
        return result;
    }

    float4 PSMain(PSInput input) : SV_TARGET
    {
        return input.color;
    }";

const HELLO_WINDOW_TITLE: &str = "Hello, world!";
const HELLO_WINDOW_TEXT: &str = "This is some useful text.";

/// Returns the triangle vertices, y is scaled by `aspect` (width / height)
pub fn triangle_vertices(aspect: f32) -> [Vertex; 3] {
    [
        Vertex {
            position: [0.0, 0.25 * aspect, 0.0],
            colour: [1.0, 0.0, 0.0, 1.0],
        },
        Vertex {
            position: [0.25, -0.25 * aspect, 0.0],
            colour: [0.0, 1.0, 0.0, 1.0],
        },
        Vertex {
            position: [-0.25, -0.25 * aspect, 0.0],
            colour: [0.0, 0.0, 1.0, 1.0],
        },
    ]
}

struct Triangle<D: Device> {
    pipeline: D::RenderPipeline,
    vertex_buffer: D::Buffer,
}

fn create_triangle<D: Device>(device: &mut D, format: gfx::Format, aspect: f32) -> Result<Triangle<D>, Error> {
    let vs = device.create_shader(
        &gfx::ShaderInfo {
            shader_type: gfx::ShaderType::Vertex,
            compile_info: Some(gfx::ShaderCompileInfo {
                entry_point: String::from("VSMain"),
                target: String::from("vs_5_0"),
            }),
        },
        TRIANGLE_SHADER_SOURCE.as_bytes(),
    )?;

    let fs = device.create_shader(
        &gfx::ShaderInfo {
            shader_type: gfx::ShaderType::Fragment,
            compile_info: Some(gfx::ShaderCompileInfo {
                entry_point: String::from("PSMain"),
                target: String::from("ps_5_0"),
            }),
        },
        TRIANGLE_SHADER_SOURCE.as_bytes(),
    )?;

    let pipeline = device.create_render_pipeline(&gfx::RenderPipelineInfo {
        vs: &vs,
        fs: &fs,
        input_layout: vec![
            gfx::InputElementInfo {
                semantic: String::from("POSITION"),
                index: 0,
                format: gfx::Format::RGB32f,
                input_slot: 0,
                aligned_byte_offset: 0,
            },
            gfx::InputElementInfo {
                semantic: String::from("COLOR"),
                index: 0,
                format: gfx::Format::RGBA32f,
                input_slot: 0,
                aligned_byte_offset: 12,
            },
        ],
        push_constants: None,
        textures: Vec::new(),
        blend_enabled: false,
        render_target_format: format,
    })?;

    let vertices = triangle_vertices(aspect);
    let vertex_buffer = device.create_buffer(
        &gfx::BufferInfo {
            usage: gfx::BufferUsage::Vertex,
            format: gfx::Format::Unknown,
            stride: std::mem::size_of::<Vertex>(),
            num_elements: vertices.len(),
        },
        Some(&vertices[..]),
    )?;

    Ok(Triangle {
        pipeline,
        vertex_buffer,
    })
}

/// Owns the device, swap chain, command buffer, triangle and gui and records one frame per `render`
pub struct Renderer<D: Device, A: os::App> {
    device: D,
    swap_chain: D::SwapChain,
    cmd_buf: D::CmdBuf,
    triangle: Option<Triangle<D>>,
    imgui: imgui::ImGui<D, A>,
    last_frame: Instant,
    frame_count: u64,
    destroyed: bool,
}

impl<D, A> Renderer<D, A> where D: Device, A: os::App {
    /// Create every gpu object needed to render frames into `window`
    pub fn create(config: &Config, window: &A::Window) -> Result<Self, Error> {
        let mut device = D::create(&gfx::DeviceInfo {
            adapter_name: config.adapter_name.clone(),
            shader_heap_size: config.shader_heap_size,
            debug_layer: config.debug_layer,
        })?;

        let swap_chain_info = gfx::SwapChainInfo {
            num_buffers: config.num_buffers,
            format: gfx::Format::RGBA8n,
            clear_colour: Some(config.clear_colour),
            vsync: config.vsync,
        };
        let swap_chain = device.create_swap_chain::<A>(&swap_chain_info, window)?;
        let cmd_buf = device.create_cmd_buf()?;

        let size = window.get_size();
        let triangle = if config.draw_triangle {
            let aspect = if size.y > 0 { size.x as f32 / size.y as f32 } else { 1.0 };
            Some(create_triangle(&mut device, swap_chain_info.format, aspect)?)
        }
        else {
            None
        };

        let imgui = imgui::ImGui::create(&mut imgui::ImGuiInfo {
            device: &mut device,
            main_window: window,
            num_buffers: config.num_buffers,
            render_target_format: swap_chain_info.format,
            config: &config.gui,
        })?;

        log::info!(
            "nilwindows::renderer: created on {} ({}x{}, {} buffers)",
            device.get_adapter_info().description, size.x, size.y, config.num_buffers
        );

        Ok(Renderer {
            device,
            swap_chain,
            cmd_buf,
            triangle,
            imgui,
            last_frame: Instant::now(),
            frame_count: 0,
            destroyed: false,
        })
    }

    fn build_ui(&mut self) -> Result<(), Error> {
        if self.imgui.is_dock_space_enabled() {
            self.imgui.dock_space_over_main_viewport();
        }
        self.imgui.text_window(HELLO_WINDOW_TITLE, HELLO_WINDOW_TEXT)
    }

    /// Record, submit and present one frame then wait for the gpu to complete it
    pub fn render(&mut self, app: &mut A, window: &mut A::Window) -> Result<(), Error> {
        if self.destroyed {
            return Err(Error::Device("render called on a destroyed renderer".to_string()));
        }

        window.update(app);
        if self.swap_chain.update::<A>(&mut self.device, window)? {
            let size = window.get_size();
            log::debug!("nilwindows::renderer: resized to {}x{}", size.x, size.y);
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.imgui.new_frame(app, window, dt);
        self.build_ui()?;
        self.imgui.finish_frame();

        self.cmd_buf.reset(&self.swap_chain)?;

        self.cmd_buf.transition_barrier(&gfx::TransitionBarrier {
            texture: self.swap_chain.get_backbuffer_texture(),
            state_before: gfx::ResourceState::Present,
            state_after: gfx::ResourceState::RenderTarget,
        });
        self.cmd_buf.begin_render_target(&self.swap_chain);

        let viewport_rect = window.get_viewport_rect();
        if let Some(triangle) = &self.triangle {
            if viewport_rect.width > 0 && viewport_rect.height > 0 {
                self.cmd_buf.set_viewport(&gfx::Viewport::from(viewport_rect));
                self.cmd_buf.set_scissor_rect(&gfx::ScissorRect::from(viewport_rect));
                self.cmd_buf.set_render_pipeline(&triangle.pipeline);
                self.cmd_buf.set_vertex_buffer(&triangle.vertex_buffer, 0);
                self.cmd_buf.draw_instanced(3, 1, 0, 0);
            }
        }

        self.cmd_buf.set_heap(self.device.get_shader_heap());
        self.imgui.render(&mut self.device, &mut self.cmd_buf)?;

        self.cmd_buf.transition_barrier(&gfx::TransitionBarrier {
            texture: self.swap_chain.get_backbuffer_texture(),
            state_before: gfx::ResourceState::RenderTarget,
            state_after: gfx::ResourceState::Present,
        });
        self.cmd_buf.close()?;
        self.device.execute(&self.cmd_buf)?;

        // secondary viewports present with their own swap chains before the main window
        self.imgui.update_platform_windows(app, &mut self.device)?;

        self.swap_chain.swap(&self.device)?;
        self.frame_count += 1;
        Ok(())
    }

    /// Wait for the gpu, release the fence event and the gui context. Calling it again does nothing.
    pub fn destroy(&mut self) -> Result<(), Error> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let result = self.swap_chain.destroy();
        self.imgui.destroy();
        log::info!("nilwindows::renderer: destroyed after {} frames", self.frame_count);
        result
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Number of frames presented
    pub fn get_frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn get_device(&self) -> &D {
        &self.device
    }

    pub fn get_swap_chain(&self) -> &D::SwapChain {
        &self.swap_chain
    }

    pub fn get_cmd_buf(&self) -> &D::CmdBuf {
        &self.cmd_buf
    }

    pub fn get_imgui(&self) -> &imgui::ImGui<D, A> {
        &self.imgui
    }
}

impl<D, A> Drop for Renderer<D, A> where D: Device, A: os::App {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            log::warn!("nilwindows::renderer: shutdown failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_is_scaled_by_aspect() {
        let verts = triangle_vertices(2.0);
        assert_eq!(verts[0].position, [0.0, 0.5, 0.0]);
        assert_eq!(verts[1].position, [0.25, -0.5, 0.0]);
        assert_eq!(verts[2].position, [-0.25, -0.5, 0.0]);
        assert_eq!(verts[0].colour, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(verts[1].colour, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(verts[2].colour, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn vertex_layout_matches_input_elements() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);
        assert_eq!(gfx::format_size_bytes(gfx::Format::RGB32f), 12);
    }
}
