use crate::gfx::{
    AdapterInfo, BufferInfo, ClearColour, DeviceInfo, Format, RenderPipelineInfo, ResourceState, ScissorRect,
    ShaderInfo, SwapChainInfo, TextureInfo, TextureUsage, TransitionBarrier, Viewport,
};
use crate::os;
use crate::os::Window;
use crate::Error;

use std::cell::RefCell;
use std::rc::Rc;

/// Counters shared by all objects created from one null `Device`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub presents: usize,
    pub executes: usize,
    /// Times the cpu blocked on the fence event
    pub fence_waits: usize,
    pub event_closes: usize,
    pub resizes: usize,
    pub buffers_created: usize,
    pub textures_created: usize,
}

#[derive(Default)]
struct Shared {
    stats: Stats,
    lose_device: bool,
}

pub struct Device {
    adapter_info: AdapterInfo,
    shader_heap: Heap,
    shared: Rc<RefCell<Shared>>,
}

pub struct Heap {
    capacity: usize,
    allocated: usize,
}

pub struct SwapChain {
    num_buffers: u32,
    bb_index: u32,
    width: i32,
    height: i32,
    format: Format,
    clear_colour: Option<ClearColour>,
    fence_value: u64,
    completed_value: u64,
    event_open: bool,
    backbuffers: Vec<Texture>,
    shared: Rc<RefCell<Shared>>,
}

/// A draw recorded into a null `CmdBuf`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub count: u32,
    pub instance_count: u32,
    pub indexed: bool,
}

pub struct CmdBuf {
    recording: bool,
    bb_index: u32,
    cleared: Option<ClearColour>,
    transitions: Vec<(ResourceState, ResourceState)>,
    draws: Vec<DrawCall>,
    pipeline_bound: bool,
    heap_bound: bool,
}

pub struct Buffer {
    data: Vec<u8>,
    num_elements: usize,
}

#[derive(Debug)]
pub struct Texture {
    srv_index: Option<usize>,
}

pub struct Shader {
    pub shader_type: crate::gfx::ShaderType,
}

pub struct RenderPipeline;

impl Device {
    /// Snapshot of the counters
    pub fn get_stats(&self) -> Stats {
        self.shared.borrow().stats
    }

    /// The next `SwapChain::swap` fails with `Error::DeviceLost`
    pub fn simulate_device_lost(&self) {
        self.shared.borrow_mut().lose_device = true;
    }
}

impl super::Device for Device {
    type SwapChain = SwapChain;
    type CmdBuf = CmdBuf;
    type Buffer = Buffer;
    type Shader = Shader;
    type RenderPipeline = RenderPipeline;
    type Texture = Texture;
    type Heap = Heap;

    fn create(info: &DeviceInfo) -> Result<Device, Error> {
        if info.shader_heap_size == 0 {
            return Err(Error::Heap("shader heap must have at least one descriptor".to_string()));
        }
        Ok(Device {
            adapter_info: AdapterInfo {
                name: "null".to_string(),
                description: "null device".to_string(),
                dedicated_video_memory: 0,
                available: vec!["null device".to_string()],
            },
            shader_heap: Heap {
                capacity: info.shader_heap_size,
                allocated: 0,
            },
            shared: Rc::new(RefCell::new(Shared::default())),
        })
    }

    fn create_swap_chain<A: os::App>(&mut self, info: &SwapChainInfo, window: &A::Window) -> Result<SwapChain, Error> {
        if !(2..=16).contains(&info.num_buffers) {
            return Err(Error::Device(format!("invalid swap chain buffer count {}", info.num_buffers)));
        }
        let size = window.get_size();
        Ok(SwapChain {
            num_buffers: info.num_buffers,
            bb_index: 0,
            width: size.x,
            height: size.y,
            format: info.format,
            clear_colour: info.clear_colour,
            fence_value: 0,
            completed_value: 0,
            event_open: true,
            backbuffers: (0..info.num_buffers).map(|_| Texture { srv_index: None }).collect(),
            shared: self.shared.clone(),
        })
    }

    fn create_cmd_buf(&self) -> Result<CmdBuf, Error> {
        Ok(CmdBuf {
            recording: false,
            bb_index: 0,
            cleared: None,
            transitions: Vec::new(),
            draws: Vec::new(),
            pipeline_bound: false,
            heap_bound: false,
        })
    }

    fn create_shader<T: Sized>(&self, info: &ShaderInfo, src: &[T]) -> Result<Shader, Error> {
        if src.is_empty() {
            return Err(Error::Shader("empty shader source".to_string()));
        }
        Ok(Shader {
            shader_type: info.shader_type,
        })
    }

    fn create_buffer<T: Sized>(&mut self, info: &BufferInfo, data: Option<&[T]>) -> Result<Buffer, Error> {
        let size = info.stride * info.num_elements;
        let mut bytes = vec![0u8; size];
        if let Some(data) = data {
            let src = super::slice_as_u8_slice(data);
            if src.len() > size {
                return Err(Error::Device(format!("buffer data of {} bytes exceeds size {}", src.len(), size)));
            }
            bytes[..src.len()].copy_from_slice(src);
        }
        self.shared.borrow_mut().stats.buffers_created += 1;
        Ok(Buffer {
            data: bytes,
            num_elements: info.num_elements,
        })
    }

    fn create_texture<T: Sized>(&mut self, info: &TextureInfo, _data: Option<&[T]>) -> Result<Texture, Error> {
        let srv_index = if info.usage.contains(TextureUsage::SHADER_RESOURCE) {
            Some(self.shader_heap.allocate()?)
        }
        else {
            None
        };
        self.shared.borrow_mut().stats.textures_created += 1;
        Ok(Texture { srv_index })
    }

    fn create_render_pipeline(&self, info: &RenderPipelineInfo<Self>) -> Result<RenderPipeline, Error> {
        if info.vs.shader_type != super::ShaderType::Vertex || info.fs.shader_type != super::ShaderType::Fragment {
            return Err(Error::Shader("pipeline shader stages are mismatched".to_string()));
        }
        Ok(RenderPipeline)
    }

    fn execute(&self, cmd: &CmdBuf) -> Result<(), Error> {
        if cmd.recording {
            return Err(Error::Device("executed a command list which is still open".to_string()));
        }
        self.shared.borrow_mut().stats.executes += 1;
        Ok(())
    }

    fn get_shader_heap(&self) -> &Heap {
        &self.shader_heap
    }

    fn get_adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }
}

impl Heap {
    fn allocate(&mut self) -> Result<usize, Error> {
        if self.allocated >= self.capacity {
            return Err(Error::Heap(format!("shader heap is full ({} descriptors)", self.capacity)));
        }
        self.allocated += 1;
        Ok(self.allocated - 1)
    }
}

impl super::Heap<Device> for Heap {
    fn get_capacity(&self) -> usize {
        self.capacity
    }

    fn get_num_allocated(&self) -> usize {
        self.allocated
    }
}

impl SwapChain {
    pub fn get_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn wait(&mut self) {
        if self.completed_value < self.fence_value {
            self.completed_value = self.fence_value;
            self.shared.borrow_mut().stats.fence_waits += 1;
        }
    }
}

impl super::SwapChain<Device> for SwapChain {
    fn update<A: os::App>(&mut self, _device: &mut Device, window: &A::Window) -> Result<bool, Error> {
        let size = window.get_size();
        if size.x <= 0 || size.y <= 0 || (size.x == self.width && size.y == self.height) {
            return Ok(false);
        }
        self.wait();
        self.width = size.x;
        self.height = size.y;
        self.bb_index = 0;
        self.shared.borrow_mut().stats.resizes += 1;
        Ok(true)
    }

    fn wait_for_last_frame(&mut self) -> Result<(), Error> {
        self.wait();
        Ok(())
    }

    fn get_num_buffers(&self) -> u32 {
        self.num_buffers
    }

    fn get_backbuffer_index(&self) -> u32 {
        self.bb_index
    }

    fn get_backbuffer_texture(&self) -> &Texture {
        &self.backbuffers[self.bb_index as usize]
    }

    fn get_backbuffer_format(&self) -> Format {
        self.format
    }

    fn get_clear_colour(&self) -> Option<ClearColour> {
        self.clear_colour
    }

    fn get_fence_value(&self) -> u64 {
        self.fence_value
    }

    fn get_completed_fence_value(&self) -> u64 {
        self.completed_value
    }

    fn swap(&mut self, _device: &Device) -> Result<(), Error> {
        {
            let mut shared = self.shared.borrow_mut();
            if shared.lose_device {
                shared.lose_device = false;
                return Err(Error::DeviceLost("simulated device removal".to_string()));
            }
            shared.stats.presents += 1;
        }
        self.fence_value += 1;
        self.wait();
        self.bb_index = (self.bb_index + 1) % self.num_buffers;
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), Error> {
        if self.event_open {
            self.wait();
            self.event_open = false;
            self.shared.borrow_mut().stats.event_closes += 1;
        }
        Ok(())
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        let _ = super::SwapChain::destroy(self);
    }
}

impl CmdBuf {
    pub fn get_draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn get_transitions(&self) -> &[(ResourceState, ResourceState)] {
        &self.transitions
    }

    /// Clear colour recorded by the last `begin_render_target`
    pub fn get_cleared(&self) -> Option<ClearColour> {
        self.cleared
    }

    pub fn is_heap_bound(&self) -> bool {
        self.heap_bound
    }

    pub fn is_pipeline_bound(&self) -> bool {
        self.pipeline_bound
    }
}

impl super::CmdBuf<Device> for CmdBuf {
    fn reset(&mut self, swap_chain: &SwapChain) -> Result<(), Error> {
        if swap_chain.completed_value < swap_chain.fence_value {
            return Err(Error::Device(format!(
                "command allocator reset while fence value {} is in flight", swap_chain.fence_value)));
        }
        self.recording = true;
        self.bb_index = swap_chain.bb_index;
        self.cleared = None;
        self.transitions.clear();
        self.draws.clear();
        self.pipeline_bound = false;
        self.heap_bound = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        if !self.recording {
            return Err(Error::Device("closed a command list which is not recording".to_string()));
        }
        self.recording = false;
        Ok(())
    }

    fn get_backbuffer_index(&self) -> u32 {
        self.bb_index
    }

    fn transition_barrier(&mut self, barrier: &TransitionBarrier<Device>) {
        self.transitions.push((barrier.state_before, barrier.state_after));
    }

    fn begin_render_target(&mut self, swap_chain: &SwapChain) {
        self.cleared = swap_chain.clear_colour;
    }

    fn set_viewport(&mut self, _viewport: &Viewport) {}

    fn set_scissor_rect(&mut self, _scissor_rect: &ScissorRect) {}

    fn set_vertex_buffer(&mut self, _buffer: &Buffer, _slot: u32) {}

    fn set_index_buffer(&mut self, _buffer: &Buffer) {}

    fn set_render_pipeline(&mut self, _pipeline: &RenderPipeline) {
        self.pipeline_bound = true;
    }

    fn set_heap(&mut self, _heap: &Heap) {
        self.heap_bound = true;
    }

    fn set_render_heap(&mut self, _slot: u32, _heap: &Heap, _offset: usize) {}

    fn push_constants<T: Sized>(&mut self, _slot: u32, _num_values: u32, _dest_offset: u32, _data: &[T]) {}

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, _start_vertex: u32, _start_instance: u32) {
        self.draws.push(DrawCall {
            count: vertex_count,
            instance_count,
            indexed: false,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _start_index: u32,
        _base_vertex: i32,
        _start_instance: u32,
    ) {
        self.draws.push(DrawCall {
            count: index_count,
            instance_count,
            indexed: true,
        });
    }
}

impl Buffer {
    pub fn get_data(&self) -> &[u8] {
        &self.data
    }
}

impl super::Buffer<Device> for Buffer {
    fn update<T: Sized>(&mut self, offset: usize, data: &[T]) -> Result<(), Error> {
        let src = super::slice_as_u8_slice(data);
        let end = offset + src.len();
        if end > self.data.len() {
            return Err(Error::Device(format!("buffer write {}..{} out of range {}", offset, end, self.data.len())));
        }
        self.data[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn get_num_elements(&self) -> usize {
        self.num_elements
    }
}

impl super::Texture<Device> for Texture {
    fn get_srv_index(&self) -> Option<usize> {
        self.srv_index
    }
}

impl super::Shader<Device> for Shader {}
impl super::RenderPipeline<Device> for RenderPipeline {}
