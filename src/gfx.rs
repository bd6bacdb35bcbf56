/// Implemets this interface with a Direct3D12 backend.
#[cfg(target_os = "windows")]
pub mod d3d12;

/// Headless device used to exercise the frame lifecycle without a gpu.
pub mod null;

use crate::os;
use crate::Error;

use serde::{Deserialize, Serialize};
use std::any::Any;

/// Structure to specify viewport coordinates on a `CmdBuf`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Structure to specify scissor rect coordinates on a `CmdBuf`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Format for resource types (textures / buffers).
/// n = normalised unsigned integer, u = unsigned integer, f = float
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Unknown,
    R16u,
    R32u,
    RG32f,
    RGB32f,
    RGBA32f,
    RGBA8n,
}

/// Values to clear colour render targets at the start of a frame
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub struct ClearColour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Information to create a device.
pub struct DeviceInfo {
    /// Optional substring of the adapter description, `None` picks the first hardware adapter
    pub adapter_name: Option<String>,
    /// Number of descriptors in the shader visible heap
    pub shader_heap_size: usize,
    /// Enable api validation
    pub debug_layer: bool,
}

/// Information about the adapter the device was created on
#[derive(Clone, Debug, Default)]
pub struct AdapterInfo {
    pub name: String,
    pub description: String,
    pub dedicated_video_memory: usize,
    /// Descriptions of every hardware adapter found while enumerating
    pub available: Vec<String>,
}

/// Information to create a swap chain bound to a window.
#[derive(Clone, Debug)]
pub struct SwapChainInfo {
    /// 2 for double buffered, 3 for tripple etc
    pub num_buffers: u32,
    pub format: Format,
    /// Colour the back buffer is cleared to by `CmdBuf::begin_render_target`
    pub clear_colour: Option<ClearColour>,
    /// Present with sync interval 1
    pub vsync: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// Information to create a buffer in cpu writable memory.
#[derive(Clone, Debug)]
pub struct BufferInfo {
    pub usage: BufferUsage,
    /// Index format, `Unknown` for vertex buffers
    pub format: Format,
    /// Size of one element in bytes
    pub stride: usize,
    pub num_elements: usize,
}

bitflags! {
    /// Describes how a texture will be used
    pub struct TextureUsage: u32 {
        const NONE = 0;
        /// Allocates a view in the shader visible heap
        const SHADER_RESOURCE = 1 << 0;
    }
}

/// Information to create a 2D texture.
#[derive(Clone, Debug)]
pub struct TextureInfo {
    pub width: u64,
    pub height: u64,
    pub format: Format,
    pub usage: TextureUsage,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderType {
    Vertex,
    Fragment,
}

/// Compile from source with an entry point and target profile, eg. `vs_5_0`
#[derive(Clone, Debug)]
pub struct ShaderCompileInfo {
    pub entry_point: String,
    pub target: String,
}

/// Information to create a shader, `None` for `compile_info` means the data is already byte code.
#[derive(Clone, Debug)]
pub struct ShaderInfo {
    pub shader_type: ShaderType,
    pub compile_info: Option<ShaderCompileInfo>,
}

/// Describes one vertex attribute.
#[derive(Clone, Debug)]
pub struct InputElementInfo {
    pub semantic: String,
    pub index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
}

/// 32 bit constants written directly into the root signature
#[derive(Clone, Debug)]
pub struct PushConstantInfo {
    pub shader_type: ShaderType,
    pub num_values: u32,
    pub shader_register: u32,
}

/// One shader resource table entry with a static linear sampler at the same register
#[derive(Clone, Debug)]
pub struct TextureBindingInfo {
    pub shader_type: ShaderType,
    pub shader_register: u32,
}

/// Information to create a pipeline, raster state is fixed to solid fill with no culling.
pub struct RenderPipelineInfo<'a, D: Device> {
    pub vs: &'a D::Shader,
    pub fs: &'a D::Shader,
    pub input_layout: Vec<InputElementInfo>,
    /// Root parameter 0 when present
    pub push_constants: Option<PushConstantInfo>,
    /// Root parameters following any push constants
    pub textures: Vec<TextureBindingInfo>,
    /// Premultiplied style src alpha / inv src alpha blending
    pub blend_enabled: bool,
    pub render_target_format: Format,
}

/// Resource states used by back buffer and texture transitions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Present,
    RenderTarget,
    ShaderResource,
    CopyDst,
}

/// A resource transition recorded with `CmdBuf::transition_barrier`
pub struct TransitionBarrier<'a, D: Device> {
    pub texture: &'a D::Texture,
    pub state_before: ResourceState,
    pub state_after: ResourceState,
}

/// A gpu device is used primarily to create resources which are used by the other objects
pub trait Device: 'static + Sized + Any {
    type SwapChain: SwapChain<Self>;
    type CmdBuf: CmdBuf<Self>;
    type Buffer: Buffer<Self>;
    type Shader: Shader<Self>;
    type RenderPipeline: RenderPipeline<Self>;
    type Texture: Texture<Self>;
    type Heap: Heap<Self>;
    /// Create the device, command queue and shader visible heap
    fn create(info: &DeviceInfo) -> Result<Self, Error>;
    /// Create a swap chain for the window's native handle
    fn create_swap_chain<A: os::App>(
        &mut self,
        info: &SwapChainInfo,
        window: &A::Window,
    ) -> Result<Self::SwapChain, Error>;
    /// Create a command allocator and list, the list is closed on return
    fn create_cmd_buf(&self) -> Result<Self::CmdBuf, Error>;
    fn create_shader<T: Sized>(&self, info: &ShaderInfo, src: &[T]) -> Result<Self::Shader, Error>;
    /// Buffers live in an upload heap and may be written at any time by `Buffer::update`
    fn create_buffer<T: Sized>(&mut self, info: &BufferInfo, data: Option<&[T]>) -> Result<Self::Buffer, Error>;
    /// Uploads `data` and waits for the copy to complete, shader resources take one slot in the shader heap
    fn create_texture<T: Sized>(&mut self, info: &TextureInfo, data: Option<&[T]>) -> Result<Self::Texture, Error>;
    fn create_render_pipeline(&self, info: &RenderPipelineInfo<Self>) -> Result<Self::RenderPipeline, Error>;
    /// Submit a closed command list to the queue
    fn execute(&self, cmd: &Self::CmdBuf) -> Result<(), Error>;
    fn get_shader_heap(&self) -> &Self::Heap;
    fn get_adapter_info(&self) -> &AdapterInfo;
}

/// Swap chain with a fence and event providing a full frame barrier in `swap`
pub trait SwapChain<D: Device>: 'static + Sized + Any {
    /// Resize the back buffers when the window client size changed, returns true if buffers were re-created
    fn update<A: os::App>(&mut self, device: &mut D, window: &A::Window) -> Result<bool, Error>;
    /// Block until the gpu completed the last signalled fence value
    fn wait_for_last_frame(&mut self) -> Result<(), Error>;
    fn get_num_buffers(&self) -> u32;
    /// Index of the back buffer the next frame renders into
    fn get_backbuffer_index(&self) -> u32;
    fn get_backbuffer_texture(&self) -> &D::Texture;
    fn get_backbuffer_format(&self) -> Format;
    fn get_clear_colour(&self) -> Option<ClearColour>;
    /// Last value signalled on the queue
    fn get_fence_value(&self) -> u64;
    fn get_completed_fence_value(&self) -> u64;
    /// Present, signal the next fence value, wait for it and advance the back buffer index
    fn swap(&mut self, device: &D) -> Result<(), Error>;
    /// Wait for the gpu and release the fence event, calling it again does nothing
    fn destroy(&mut self) -> Result<(), Error>;
}

/// Responsible for buffering graphics commands
pub trait CmdBuf<D: Device>: 'static + Sized + Any {
    /// Reset allocator and list, errors if the gpu has not completed the previous frame
    fn reset(&mut self, swap_chain: &D::SwapChain) -> Result<(), Error>;
    fn close(&mut self) -> Result<(), Error>;
    fn get_backbuffer_index(&self) -> u32;
    fn transition_barrier(&mut self, barrier: &TransitionBarrier<D>);
    /// Clear the current back buffer to the swap chain clear colour and bind it as render target
    fn begin_render_target(&mut self, swap_chain: &D::SwapChain);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor_rect(&mut self, scissor_rect: &ScissorRect);
    fn set_vertex_buffer(&mut self, buffer: &D::Buffer, slot: u32);
    fn set_index_buffer(&mut self, buffer: &D::Buffer);
    fn set_render_pipeline(&mut self, pipeline: &D::RenderPipeline);
    /// Make `heap` the active shader visible heap
    fn set_heap(&mut self, heap: &D::Heap);
    /// Bind a descriptor table starting at `offset` in `heap` to root parameter `slot`
    fn set_render_heap(&mut self, slot: u32, heap: &D::Heap, offset: usize);
    fn push_constants<T: Sized>(&mut self, slot: u32, num_values: u32, dest_offset: u32, data: &[T]);
    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32);
    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );
}

pub trait Buffer<D: Device>: 'static + Sized + Any {
    /// Write `data` at byte `offset`
    fn update<T: Sized>(&mut self, offset: usize, data: &[T]) -> Result<(), Error>;
    /// Capacity in elements
    fn get_num_elements(&self) -> usize;
}

pub trait Texture<D: Device>: 'static + Sized + Any {
    /// Slot in the shader visible heap for textures with `TextureUsage::SHADER_RESOURCE`
    fn get_srv_index(&self) -> Option<usize>;
}

pub trait Heap<D: Device>: 'static + Sized + Any {
    fn get_capacity(&self) -> usize;
    fn get_num_allocated(&self) -> usize;
}

pub trait Shader<D: Device>: 'static + Sized + Any {}
pub trait RenderPipeline<D: Device>: 'static + Sized + Any {}

impl From<os::Rect<i32>> for Viewport {
    fn from(rect: os::Rect<i32>) -> Viewport {
        Viewport {
            x: rect.x as f32,
            y: rect.y as f32,
            width: rect.width as f32,
            height: rect.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl From<os::Rect<i32>> for ScissorRect {
    fn from(rect: os::Rect<i32>) -> ScissorRect {
        ScissorRect {
            left: rect.x,
            top: rect.y,
            right: rect.x + rect.width,
            bottom: rect.y + rect.height,
        }
    }
}

/// Returns the size in bytes of one element of `format`
pub fn format_size_bytes(format: Format) -> u32 {
    match format {
        Format::Unknown => 0,
        Format::R16u => 2,
        Format::R32u => 4,
        Format::RG32f => 8,
        Format::RGB32f => 12,
        Format::RGBA32f => 16,
        Format::RGBA8n => 4,
    }
}

/// Take any sized type and return a u8 slice. This can be useful to pass `data` to `Device::create_buffer`.
pub fn as_u8_slice<T: Sized>(p: &T) -> &[u8] {
    unsafe { ::std::slice::from_raw_parts((p as *const T) as *const u8, ::std::mem::size_of::<T>()) }
}

/// Reinterpret a slice of sized types as bytes
pub fn slice_as_u8_slice<T: Sized>(p: &[T]) -> &[u8] {
    unsafe { ::std::slice::from_raw_parts(p.as_ptr() as *const u8, std::mem::size_of_val(p)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_from_rect_uses_extents() {
        let rect = os::Rect {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        let scissor = ScissorRect::from(rect);
        assert_eq!(scissor.right, 110);
        assert_eq!(scissor.bottom, 70);
    }

    #[test]
    fn byte_views() {
        let verts = [[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(slice_as_u8_slice(&verts).len(), 24);
        assert_eq!(as_u8_slice(&verts[0]).len(), 12);
        assert_eq!(format_size_bytes(Format::RGB32f), 12);
    }
}
