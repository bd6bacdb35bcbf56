use crate::gfx::{
    AdapterInfo, BufferInfo, BufferUsage, ClearColour, DeviceInfo, Format, RenderPipelineInfo, ResourceState,
    ScissorRect, ShaderInfo, ShaderType, SwapChainInfo, TextureInfo, TextureUsage, TransitionBarrier, Viewport,
};
use crate::os;
use crate::os::{NativeHandle, Window};
use crate::Error;

use std::ffi::{c_void, CString};

use windows::{
    core::PCSTR,
    Win32::Foundation::*,
    Win32::Graphics::Direct3D::Fxc::*,
    Win32::Graphics::Direct3D::*,
    Win32::Graphics::Direct3D12::*,
    Win32::Graphics::Dxgi::Common::*,
    Win32::Graphics::Dxgi::*,
    Win32::System::Threading::*,
};
use windows_core::Interface;

pub struct Device {
    adapter_info: AdapterInfo,
    dxgi_factory: IDXGIFactory4,
    device: ID3D12Device,
    command_queue: ID3D12CommandQueue,
    shader_heap: Heap,
}

pub struct Heap {
    heap: ID3D12DescriptorHeap,
    cpu_base: usize,
    gpu_base: u64,
    increment_size: usize,
    capacity: usize,
    allocated: usize,
}

pub struct SwapChain {
    width: i32,
    height: i32,
    num_buffers: u32,
    format: Format,
    clear_colour: Option<ClearColour>,
    vsync: bool,
    bb_index: u32,
    fence: ID3D12Fence,
    fence_last_signalled_value: u64,
    fence_event: Option<HANDLE>,
    swap_chain: IDXGISwapChain3,
    rtv_heap: ID3D12DescriptorHeap,
    rtv_increment_size: usize,
    backbuffers: Vec<Texture>,
}

pub struct CmdBuf {
    bb_index: u32,
    command_allocator: ID3D12CommandAllocator,
    command_list: ID3D12GraphicsCommandList,
}

pub struct Buffer {
    resource: ID3D12Resource,
    vbv: Option<D3D12_VERTEX_BUFFER_VIEW>,
    ibv: Option<D3D12_INDEX_BUFFER_VIEW>,
    size_bytes: usize,
    num_elements: usize,
}

pub struct Texture {
    resource: ID3D12Resource,
    rtv: Option<D3D12_CPU_DESCRIPTOR_HANDLE>,
    srv_index: Option<usize>,
}

pub struct Shader {
    byte_code: Vec<u8>,
    shader_type: ShaderType,
}

pub struct RenderPipeline {
    pso: ID3D12PipelineState,
    root_signature: ID3D12RootSignature,
}

fn to_dxgi_format(format: Format) -> DXGI_FORMAT {
    match format {
        Format::Unknown => DXGI_FORMAT_UNKNOWN,
        Format::R16u => DXGI_FORMAT_R16_UINT,
        Format::R32u => DXGI_FORMAT_R32_UINT,
        Format::RG32f => DXGI_FORMAT_R32G32_FLOAT,
        Format::RGB32f => DXGI_FORMAT_R32G32B32_FLOAT,
        Format::RGBA32f => DXGI_FORMAT_R32G32B32A32_FLOAT,
        Format::RGBA8n => DXGI_FORMAT_R8G8B8A8_UNORM,
    }
}

fn to_d3d12_resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::ShaderResource => D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
        ResourceState::CopyDst => D3D12_RESOURCE_STATE_COPY_DEST,
    }
}

fn to_d3d12_shader_visibility(shader_type: ShaderType) -> D3D12_SHADER_VISIBILITY {
    match shader_type {
        ShaderType::Vertex => D3D12_SHADER_VISIBILITY_VERTEX,
        ShaderType::Fragment => D3D12_SHADER_VISIBILITY_PIXEL,
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: std::mem::ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // borrowed without add ref, the barrier never outlives `resource`
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: state_before,
                StateAfter: state_after,
            }),
        },
    }
}

fn adapter_description(desc: &DXGI_ADAPTER_DESC1) -> String {
    let len = desc.Description.iter().position(|c| *c == 0).unwrap_or(desc.Description.len());
    String::from_utf16_lossy(&desc.Description[..len])
}

/// Enumerates hardware adapters which support feature level 11_0 and selects `adapter_name` if supplied
fn get_hardware_adapter(
    factory: &IDXGIFactory4,
    adapter_name: &Option<String>,
) -> Result<(IDXGIAdapter1, AdapterInfo), Error> {
    let mut candidates: Vec<(IDXGIAdapter1, DXGI_ADAPTER_DESC1)> = Vec::new();
    unsafe {
        let mut i = 0;
        while let Ok(adapter) = factory.EnumAdapters1(i) {
            i += 1;
            let desc = adapter.GetDesc1()?;
            if (desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
                // skip the basic render driver
                continue;
            }
            if D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, std::ptr::null_mut::<Option<ID3D12Device>>())
                .is_ok()
            {
                candidates.push((adapter, desc));
            }
        }
    }

    let available: Vec<String> = candidates.iter().map(|(_, desc)| adapter_description(desc)).collect();
    for name in &available {
        log::debug!("nilwindows::gfx::d3d12: found adapter {}", name);
    }

    let mut selected = 0;
    if let Some(adapter_name) = adapter_name {
        match available.iter().position(|desc| desc.contains(adapter_name.as_str())) {
            Some(index) => selected = index,
            None => log::warn!(
                "nilwindows::gfx::d3d12: adapter '{}' not found, using the first hardware adapter", adapter_name),
        }
    }

    if candidates.is_empty() {
        return Err(Error::Device("no hardware adapter supports Direct3D 12".to_string()));
    }
    let (adapter, desc) = candidates.swap_remove(selected);
    let info = AdapterInfo {
        name: "d3d12".to_string(),
        description: adapter_description(&desc),
        dedicated_video_memory: desc.DedicatedVideoMemory,
        available,
    };
    Ok((adapter, info))
}

fn blob_to_string(blob: &Option<ID3DBlob>) -> String {
    match blob {
        Some(blob) => unsafe {
            let bytes = std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize());
            String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
        },
        None => String::new(),
    }
}

fn create_root_signature(device: &ID3D12Device, info: &RenderPipelineInfo<Device>) -> Result<ID3D12RootSignature, Error> {
    let ranges: Vec<D3D12_DESCRIPTOR_RANGE> = info
        .textures
        .iter()
        .map(|t| D3D12_DESCRIPTOR_RANGE {
            RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
            NumDescriptors: 1,
            BaseShaderRegister: t.shader_register,
            RegisterSpace: 0,
            OffsetInDescriptorsFromTableStart: 0,
        })
        .collect();

    let mut params: Vec<D3D12_ROOT_PARAMETER> = Vec::new();
    if let Some(constants) = &info.push_constants {
        params.push(D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                Constants: D3D12_ROOT_CONSTANTS {
                    ShaderRegister: constants.shader_register,
                    RegisterSpace: 0,
                    Num32BitValues: constants.num_values,
                },
            },
            ShaderVisibility: to_d3d12_shader_visibility(constants.shader_type),
        });
    }
    for (texture, range) in info.textures.iter().zip(ranges.iter()) {
        params.push(D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                    NumDescriptorRanges: 1,
                    pDescriptorRanges: range,
                },
            },
            ShaderVisibility: to_d3d12_shader_visibility(texture.shader_type),
        });
    }

    let samplers: Vec<D3D12_STATIC_SAMPLER_DESC> = info
        .textures
        .iter()
        .map(|t| D3D12_STATIC_SAMPLER_DESC {
            Filter: D3D12_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D12_TEXTURE_ADDRESS_MODE_WRAP,
            AddressV: D3D12_TEXTURE_ADDRESS_MODE_WRAP,
            AddressW: D3D12_TEXTURE_ADDRESS_MODE_WRAP,
            MipLODBias: 0.0,
            MaxAnisotropy: 0,
            ComparisonFunc: D3D12_COMPARISON_FUNC_ALWAYS,
            BorderColor: D3D12_STATIC_BORDER_COLOR_TRANSPARENT_BLACK,
            MinLOD: 0.0,
            MaxLOD: 0.0,
            ShaderRegister: t.shader_register,
            RegisterSpace: 0,
            ShaderVisibility: to_d3d12_shader_visibility(t.shader_type),
        })
        .collect();

    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: params.len() as u32,
        pParameters: if params.is_empty() { std::ptr::null() } else { params.as_ptr() },
        NumStaticSamplers: samplers.len() as u32,
        pStaticSamplers: if samplers.is_empty() { std::ptr::null() } else { samplers.as_ptr() },
        Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };

    unsafe {
        let mut signature: Option<ID3DBlob> = None;
        let mut errors: Option<ID3DBlob> = None;
        if let Err(err) = D3D12SerializeRootSignature(&desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut signature, Some(&mut errors)) {
            return Err(Error::Device(format!("failed to serialise root signature: {} {}", err, blob_to_string(&errors))));
        }
        let signature = signature.ok_or_else(|| Error::Device("root signature blob is null".to_string()))?;
        let data = std::slice::from_raw_parts(signature.GetBufferPointer() as *const u8, signature.GetBufferSize());
        Ok(device.CreateRootSignature(0, data)?)
    }
}

fn create_shader_heap(device: &ID3D12Device, num_descriptors: usize) -> Result<Heap, Error> {
    if num_descriptors == 0 {
        return Err(Error::Heap("shader heap needs at least one descriptor".to_string()));
    }
    unsafe {
        let heap: ID3D12DescriptorHeap = device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
            Type: D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            NumDescriptors: num_descriptors as u32,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
            NodeMask: 0,
        })?;
        Ok(Heap {
            cpu_base: heap.GetCPUDescriptorHandleForHeapStart().ptr,
            gpu_base: heap.GetGPUDescriptorHandleForHeapStart().ptr,
            increment_size: device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV) as usize,
            heap,
            capacity: num_descriptors,
            allocated: 0,
        })
    }
}

impl Device {
    fn create_committed(&self, heap_type: D3D12_HEAP_TYPE, desc: &D3D12_RESOURCE_DESC, state: D3D12_RESOURCE_STATES) -> Result<ID3D12Resource, Error> {
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &D3D12_HEAP_PROPERTIES {
                    Type: heap_type,
                    ..Default::default()
                },
                D3D12_HEAP_FLAG_NONE,
                desc,
                state,
                None,
                &mut resource,
            )?;
        }
        resource.ok_or_else(|| Error::Device("CreateCommittedResource returned null".to_string()))
    }

    fn buffer_desc(size: u64) -> D3D12_RESOURCE_DESC {
        D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            ..Default::default()
        }
    }

    /// Records a copy from `upload` into `texture` on a temporary list and blocks until it completes
    fn upload_texture(&self, texture: &ID3D12Resource, upload: &ID3D12Resource, footprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT) -> Result<(), Error> {
        unsafe {
            let src_location = D3D12_TEXTURE_COPY_LOCATION {
                pResource: std::mem::transmute_copy(upload),
                Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
                Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                    PlacedFootprint: footprint,
                },
            };
            let dst_location = D3D12_TEXTURE_COPY_LOCATION {
                pResource: std::mem::transmute_copy(texture),
                Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
                Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                    SubresourceIndex: 0,
                },
            };

            let allocator: ID3D12CommandAllocator = self.device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)?;
            let list: ID3D12GraphicsCommandList =
                self.device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocator, None)?;
            list.CopyTextureRegion(&dst_location, 0, 0, 0, &src_location, None);
            list.ResourceBarrier(&[transition_barrier(
                texture,
                D3D12_RESOURCE_STATE_COPY_DEST,
                D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
            )]);
            list.Close()?;

            let fence: ID3D12Fence = self.device.CreateFence(0, D3D12_FENCE_FLAG_NONE)?;
            let event = CreateEventA(None, false, false, None)?;
            self.command_queue.ExecuteCommandLists(&[Some(list.cast()?)]);
            let result = self
                .command_queue
                .Signal(&fence, 1)
                .and_then(|_| fence.SetEventOnCompletion(1, event));
            if result.is_ok() {
                WaitForSingleObject(event, INFINITE);
            }
            CloseHandle(event)?;
            result?;
        }
        Ok(())
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
        unsafe {
            // enable debug layer
            let mut dxgi_factory_flags = DXGI_CREATE_FACTORY_FLAGS(0);
            if info.debug_layer {
                let mut debug: Option<ID3D12Debug> = None;
                if let Some(debug) = D3D12GetDebugInterface(&mut debug).ok().and(debug) {
                    debug.EnableDebugLayer();
                    log::info!("nilwindows::gfx::d3d12: enabling debug layer");
                    dxgi_factory_flags = DXGI_CREATE_FACTORY_DEBUG;
                }
                else {
                    log::warn!("nilwindows::gfx::d3d12: debug layer requested but not available");
                }
            }

            // the debug factory needs the graphics tools installed
            let dxgi_factory: IDXGIFactory4 = match CreateDXGIFactory2(dxgi_factory_flags) {
                Ok(factory) => factory,
                Err(err) if dxgi_factory_flags != DXGI_CREATE_FACTORY_FLAGS(0) => {
                    log::warn!("nilwindows::gfx::d3d12: debug dxgi factory unavailable ({}), retrying without", err);
                    CreateDXGIFactory2(DXGI_CREATE_FACTORY_FLAGS(0))?
                }
                Err(err) => return Err(err.into()),
            };

            let (adapter, adapter_info) = get_hardware_adapter(&dxgi_factory, &info.adapter_name)?;
            log::info!(
                "nilwindows::gfx::d3d12: using adapter {} ({} MB)",
                adapter_info.description,
                adapter_info.dedicated_video_memory / (1024 * 1024)
            );

            let mut device: Option<ID3D12Device> = None;
            D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device)?;
            let device = device.ok_or_else(|| Error::Device("D3D12CreateDevice returned null".to_string()))?;

            let command_queue: ID3D12CommandQueue = device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                NodeMask: 1,
                ..Default::default()
            })?;

            let shader_heap = create_shader_heap(&device, info.shader_heap_size)?;
            Ok(Device {
                adapter_info,
                dxgi_factory,
                device,
                command_queue,
                shader_heap,
            })
        }
    }

    fn create_swap_chain<A: os::App>(&mut self, info: &SwapChainInfo, window: &A::Window) -> Result<SwapChain, Error> {
        unsafe {
            let size = window.get_size();
            let hwnd = HWND(window.get_native_handle().get_isize() as *mut c_void);

            let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
                BufferCount: info.num_buffers,
                Width: size.x as u32,
                Height: size.y as u32,
                Format: to_dxgi_format(info.format),
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    ..Default::default()
                },
                ..Default::default()
            };

            let swap_chain: IDXGISwapChain3 = self
                .dxgi_factory
                .CreateSwapChainForHwnd(&self.command_queue, hwnd, &swap_chain_desc, None, None)?
                .cast()?;

            let rtv_heap: ID3D12DescriptorHeap = self.device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                NumDescriptors: info.num_buffers,
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                ..Default::default()
            })?;
            let rtv_increment_size = self.device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) as usize;

            let fence: ID3D12Fence = self.device.CreateFence(0, D3D12_FENCE_FLAG_NONE)?;
            let fence_event = CreateEventA(None, false, false, None)?;

            let mut swap_chain = SwapChain {
                width: size.x,
                height: size.y,
                num_buffers: info.num_buffers,
                format: info.format,
                clear_colour: info.clear_colour,
                vsync: info.vsync,
                bb_index: 0,
                fence,
                fence_last_signalled_value: 0,
                fence_event: Some(fence_event),
                swap_chain,
                rtv_heap,
                rtv_increment_size,
                backbuffers: Vec::new(),
            };
            swap_chain.create_backbuffers(self)?;
            log::info!(
                "nilwindows::gfx::d3d12: created swap chain {}x{} with {} buffers",
                size.x, size.y, info.num_buffers
            );
            Ok(swap_chain)
        }
    }

    fn create_cmd_buf(&self) -> Result<CmdBuf, Error> {
        unsafe {
            let command_allocator: ID3D12CommandAllocator =
                self.device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)?;
            let command_list: ID3D12GraphicsCommandList =
                self.device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &command_allocator, None)?;
            // created in the recording state, reset opens it each frame
            command_list.Close()?;
            Ok(CmdBuf {
                bb_index: 0,
                command_allocator,
                command_list,
            })
        }
    }

    fn create_shader<T: Sized>(&self, info: &ShaderInfo, src: &[T]) -> Result<Shader, Error> {
        let src = super::slice_as_u8_slice(src);
        let compile_info = match &info.compile_info {
            Some(compile_info) => compile_info,
            None => {
                return Ok(Shader {
                    byte_code: src.to_vec(),
                    shader_type: info.shader_type,
                })
            }
        };

        let entry_point = CString::new(compile_info.entry_point.as_str())
            .map_err(|e| Error::Shader(format!("invalid entry point: {}", e)))?;
        let target = CString::new(compile_info.target.as_str())
            .map_err(|e| Error::Shader(format!("invalid target: {}", e)))?;

        let compile_flags = if cfg!(debug_assertions) {
            D3DCOMPILE_DEBUG | D3DCOMPILE_SKIP_OPTIMIZATION
        }
        else {
            0
        };

        unsafe {
            let mut shader_blob: Option<ID3DBlob> = None;
            let mut errors: Option<ID3DBlob> = None;
            let result = D3DCompile(
                src.as_ptr() as *const c_void,
                src.len(),
                None,
                None,
                None,
                PCSTR(entry_point.as_ptr() as *const u8),
                PCSTR(target.as_ptr() as *const u8),
                compile_flags,
                0,
                &mut shader_blob,
                Some(&mut errors),
            );
            if let Err(err) = result {
                return Err(Error::Shader(format!(
                    "{} ({}): {} {}",
                    compile_info.entry_point, compile_info.target, err, blob_to_string(&errors)
                )));
            }
            let blob = shader_blob.ok_or_else(|| Error::Shader("D3DCompile returned no byte code".to_string()))?;
            let byte_code = std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize());
            Ok(Shader {
                byte_code: byte_code.to_vec(),
                shader_type: info.shader_type,
            })
        }
    }

    fn create_buffer<T: Sized>(&mut self, info: &BufferInfo, data: Option<&[T]>) -> Result<Buffer, Error> {
        let size_bytes = info.stride * info.num_elements;
        if size_bytes == 0 {
            return Err(Error::Device("cannot create a zero sized buffer".to_string()));
        }
        let resource = self.create_committed(
            D3D12_HEAP_TYPE_UPLOAD,
            &Device::buffer_desc(size_bytes as u64),
            D3D12_RESOURCE_STATE_GENERIC_READ,
        )?;

        let location = unsafe { resource.GetGPUVirtualAddress() };
        let (vbv, ibv) = match info.usage {
            BufferUsage::Vertex => (
                Some(D3D12_VERTEX_BUFFER_VIEW {
                    BufferLocation: location,
                    StrideInBytes: info.stride as u32,
                    SizeInBytes: size_bytes as u32,
                }),
                None,
            ),
            BufferUsage::Index => (
                None,
                Some(D3D12_INDEX_BUFFER_VIEW {
                    BufferLocation: location,
                    SizeInBytes: size_bytes as u32,
                    Format: to_dxgi_format(info.format),
                }),
            ),
        };

        let mut buffer = Buffer {
            resource,
            vbv,
            ibv,
            size_bytes,
            num_elements: info.num_elements,
        };
        if let Some(data) = data {
            super::Buffer::update(&mut buffer, 0, data)?;
        }
        Ok(buffer)
    }

    fn create_texture<T: Sized>(&mut self, info: &TextureInfo, data: Option<&[T]>) -> Result<Texture, Error> {
        let srv_index = if info.usage.contains(TextureUsage::SHADER_RESOURCE) {
            Some(self.shader_heap.allocate()?)
        }
        else {
            None
        };

        let format = to_dxgi_format(info.format);
        let initial_state = if data.is_some() {
            D3D12_RESOURCE_STATE_COPY_DEST
        }
        else {
            D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE
        };
        let resource = self.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                Width: info.width,
                Height: info.height as u32,
                DepthOrArraySize: 1,
                MipLevels: 1,
                Format: format,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                ..Default::default()
            },
            initial_state,
        )?;

        if let Some(data) = data {
            let src = super::slice_as_u8_slice(data);
            let row_size = info.width as usize * super::format_size_bytes(info.format) as usize;
            let pitch = row_size.next_multiple_of(D3D12_TEXTURE_DATA_PITCH_ALIGNMENT as usize);
            if src.len() < row_size * info.height as usize {
                return Err(Error::Device(format!(
                    "texture data of {} bytes is smaller than {}x{}", src.len(), info.width, info.height)));
            }

            let upload_size = pitch * info.height as usize;
            let upload = self.create_committed(
                D3D12_HEAP_TYPE_UPLOAD,
                &Device::buffer_desc(upload_size as u64),
                D3D12_RESOURCE_STATE_GENERIC_READ,
            )?;
            unsafe {
                let mut mapped: *mut c_void = std::ptr::null_mut();
                upload.Map(0, None, Some(&mut mapped))?;
                let mapped = mapped as *mut u8;
                for y in 0..info.height as usize {
                    std::ptr::copy_nonoverlapping(src.as_ptr().add(y * row_size), mapped.add(y * pitch), row_size);
                }
                upload.Unmap(0, None);
            }

            self.upload_texture(
                &resource,
                &upload,
                D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                    Offset: 0,
                    Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                        Format: format,
                        Width: info.width as u32,
                        Height: info.height as u32,
                        Depth: 1,
                        RowPitch: pitch as u32,
                    },
                },
            )?;
        }

        if let Some(index) = srv_index {
            unsafe {
                self.device.CreateShaderResourceView(
                    &resource,
                    Some(&D3D12_SHADER_RESOURCE_VIEW_DESC {
                        Format: format,
                        ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
                        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                        Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                            Texture2D: D3D12_TEX2D_SRV {
                                MipLevels: 1,
                                ..Default::default()
                            },
                        },
                    }),
                    self.shader_heap.cpu_handle(index),
                );
            }
        }

        Ok(Texture {
            resource,
            rtv: None,
            srv_index,
        })
    }

    fn create_render_pipeline(&self, info: &RenderPipelineInfo<Self>) -> Result<RenderPipeline, Error> {
        if info.vs.shader_type != ShaderType::Vertex || info.fs.shader_type != ShaderType::Fragment {
            return Err(Error::Shader("render pipeline needs a vertex and a fragment shader".to_string()));
        }
        let root_signature = create_root_signature(&self.device, info)?;

        // semantic names must outlive the pipeline desc
        let semantics = info
            .input_layout
            .iter()
            .map(|e| CString::new(e.semantic.as_str()))
            .collect::<Result<Vec<CString>, _>>()
            .map_err(|e| Error::Shader(format!("invalid semantic: {}", e)))?;

        let input_elements: Vec<D3D12_INPUT_ELEMENT_DESC> = info
            .input_layout
            .iter()
            .zip(semantics.iter())
            .map(|(e, semantic)| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(semantic.as_ptr() as *const u8),
                SemanticIndex: e.index,
                Format: to_dxgi_format(e.format),
                InputSlot: e.input_slot,
                AlignedByteOffset: e.aligned_byte_offset,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();

        let (src_blend, dst_blend, dst_blend_alpha) = if info.blend_enabled {
            (D3D12_BLEND_SRC_ALPHA, D3D12_BLEND_INV_SRC_ALPHA, D3D12_BLEND_INV_SRC_ALPHA)
        }
        else {
            (D3D12_BLEND_ONE, D3D12_BLEND_ZERO, D3D12_BLEND_ZERO)
        };

        let default_stencil_op = D3D12_DEPTH_STENCILOP_DESC {
            StencilFailOp: D3D12_STENCIL_OP_KEEP,
            StencilDepthFailOp: D3D12_STENCIL_OP_KEEP,
            StencilPassOp: D3D12_STENCIL_OP_KEEP,
            StencilFunc: D3D12_COMPARISON_FUNC_ALWAYS,
        };

        let mut desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: unsafe { std::mem::transmute_copy(&root_signature) },
            VS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: info.vs.byte_code.as_ptr() as *const c_void,
                BytecodeLength: info.vs.byte_code.len(),
            },
            PS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: info.fs.byte_code.as_ptr() as *const c_void,
                BytecodeLength: info.fs.byte_code.len(),
            },
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: input_elements.as_ptr(),
                NumElements: input_elements.len() as u32,
            },
            RasterizerState: D3D12_RASTERIZER_DESC {
                FillMode: D3D12_FILL_MODE_SOLID,
                CullMode: D3D12_CULL_MODE_NONE,
                DepthClipEnable: true.into(),
                ..Default::default()
            },
            BlendState: D3D12_BLEND_DESC {
                AlphaToCoverageEnable: false.into(),
                IndependentBlendEnable: false.into(),
                RenderTarget: [
                    D3D12_RENDER_TARGET_BLEND_DESC {
                        BlendEnable: info.blend_enabled.into(),
                        LogicOpEnable: false.into(),
                        SrcBlend: src_blend,
                        DestBlend: dst_blend,
                        BlendOp: D3D12_BLEND_OP_ADD,
                        SrcBlendAlpha: D3D12_BLEND_ONE,
                        DestBlendAlpha: dst_blend_alpha,
                        BlendOpAlpha: D3D12_BLEND_OP_ADD,
                        LogicOp: D3D12_LOGIC_OP_NOOP,
                        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
                    },
                    D3D12_RENDER_TARGET_BLEND_DESC::default(),
                    D3D12_RENDER_TARGET_BLEND_DESC::default(),
                    D3D12_RENDER_TARGET_BLEND_DESC::default(),
                    D3D12_RENDER_TARGET_BLEND_DESC::default(),
                    D3D12_RENDER_TARGET_BLEND_DESC::default(),
                    D3D12_RENDER_TARGET_BLEND_DESC::default(),
                    D3D12_RENDER_TARGET_BLEND_DESC::default(),
                ],
            },
            DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
                DepthEnable: false.into(),
                DepthWriteMask: D3D12_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D12_COMPARISON_FUNC_ALWAYS,
                StencilEnable: false.into(),
                FrontFace: default_stencil_op,
                BackFace: default_stencil_op,
                ..Default::default()
            },
            SampleMask: u32::MAX,
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
            NumRenderTargets: 1,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        desc.RTVFormats[0] = to_dxgi_format(info.render_target_format);

        let pso: ID3D12PipelineState = unsafe { self.device.CreateGraphicsPipelineState(&desc)? };
        Ok(RenderPipeline {
            pso,
            root_signature,
        })
    }

    fn execute(&self, cmd: &CmdBuf) -> Result<(), Error> {
        unsafe {
            self.command_queue.ExecuteCommandLists(&[Some(cmd.command_list.cast()?)]);
        }
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

    fn cpu_handle(&self, index: usize) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_base + index * self.increment_size,
        }
    }

    fn gpu_handle(&self, index: usize) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: self.gpu_base + (index * self.increment_size) as u64,
        }
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
    /// Fetch the swap chain buffers and write one render target view per buffer
    fn create_backbuffers(&mut self, device: &Device) -> Result<(), Error> {
        unsafe {
            let rtv_start = self.rtv_heap.GetCPUDescriptorHandleForHeapStart();
            let mut backbuffers = Vec::new();
            for i in 0..self.num_buffers {
                let resource: ID3D12Resource = self.swap_chain.GetBuffer(i)?;
                let handle = D3D12_CPU_DESCRIPTOR_HANDLE {
                    ptr: rtv_start.ptr + i as usize * self.rtv_increment_size,
                };
                device.device.CreateRenderTargetView(&resource, None, handle);
                backbuffers.push(Texture {
                    resource,
                    rtv: Some(handle),
                    srv_index: None,
                });
            }
            self.backbuffers = backbuffers;
            self.bb_index = self.swap_chain.GetCurrentBackBufferIndex();
        }
        Ok(())
    }

    fn wait_for_value(&self, value: u64) -> Result<(), Error> {
        unsafe {
            if self.fence.GetCompletedValue() < value {
                let event = self
                    .fence_event
                    .ok_or_else(|| Error::Device("fence event already closed".to_string()))?;
                self.fence.SetEventOnCompletion(value, event)?;
                WaitForSingleObject(event, INFINITE);
            }
        }
        Ok(())
    }
}

impl super::SwapChain<Device> for SwapChain {
    fn update<A: os::App>(&mut self, device: &mut Device, window: &A::Window) -> Result<bool, Error> {
        let size = window.get_size();
        if size.x <= 0 || size.y <= 0 || (size.x == self.width && size.y == self.height) {
            return Ok(false);
        }

        self.wait_for_last_frame()?;

        // all references to the buffers must be released before resizing
        self.backbuffers.clear();
        unsafe {
            self.swap_chain.ResizeBuffers(
                self.num_buffers,
                size.x as u32,
                size.y as u32,
                DXGI_FORMAT_UNKNOWN,
                DXGI_SWAP_CHAIN_FLAG(0),
            )?;
        }
        self.create_backbuffers(device)?;
        self.width = size.x;
        self.height = size.y;
        log::debug!("nilwindows::gfx::d3d12: resized swap chain to {}x{}", size.x, size.y);
        Ok(true)
    }

    fn wait_for_last_frame(&mut self) -> Result<(), Error> {
        self.wait_for_value(self.fence_last_signalled_value)
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
        self.fence_last_signalled_value
    }

    fn get_completed_fence_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn swap(&mut self, device: &Device) -> Result<(), Error> {
        unsafe {
            let sync_interval = if self.vsync { 1 } else { 0 };
            if let Err(err) = self.swap_chain.Present(sync_interval, DXGI_PRESENT(0)).ok() {
                if let Err(reason) = device.device.GetDeviceRemovedReason() {
                    log::error!("nilwindows::gfx::d3d12: device removed: {}", reason);
                }
                return Err(err.into());
            }

            let fv = self.fence_last_signalled_value + 1;
            device.command_queue.Signal(&self.fence, fv)?;
            self.fence_last_signalled_value = fv;
            self.wait_for_value(fv)?;

            self.bb_index = self.swap_chain.GetCurrentBackBufferIndex();
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), Error> {
        if self.fence_event.is_none() {
            return Ok(());
        }
        let waited = self.wait_for_last_frame();
        if let Some(event) = self.fence_event.take() {
            unsafe {
                CloseHandle(event)?;
            }
            log::debug!("nilwindows::gfx::d3d12: closed fence event");
        }
        waited
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        if let Err(err) = super::SwapChain::destroy(self) {
            log::warn!("nilwindows::gfx::d3d12: swap chain shutdown failed: {}", err);
        }
    }
}

impl super::CmdBuf<Device> for CmdBuf {
    fn reset(&mut self, swap_chain: &SwapChain) -> Result<(), Error> {
        let completed = unsafe { swap_chain.fence.GetCompletedValue() };
        if completed < swap_chain.fence_last_signalled_value {
            return Err(Error::Device(format!(
                "command allocator reset while fence value {} is in flight (completed {})",
                swap_chain.fence_last_signalled_value, completed
            )));
        }
        unsafe {
            self.command_allocator.Reset()?;
            self.command_list.Reset(&self.command_allocator, None)?;
        }
        self.bb_index = swap_chain.bb_index;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        unsafe {
            self.command_list.Close()?;
        }
        Ok(())
    }

    fn get_backbuffer_index(&self) -> u32 {
        self.bb_index
    }

    fn transition_barrier(&mut self, barrier: &TransitionBarrier<Device>) {
        unsafe {
            self.command_list.ResourceBarrier(&[transition_barrier(
                &barrier.texture.resource,
                to_d3d12_resource_state(barrier.state_before),
                to_d3d12_resource_state(barrier.state_after),
            )]);
        }
    }

    fn begin_render_target(&mut self, swap_chain: &SwapChain) {
        let rtv = match swap_chain.get_backbuffer_texture_rtv() {
            Some(rtv) => rtv,
            None => return,
        };
        unsafe {
            if let Some(cc) = swap_chain.clear_colour {
                self.command_list.ClearRenderTargetView(rtv, &[cc.r, cc.g, cc.b, cc.a], None);
            }
            self.command_list.OMSetRenderTargets(1, Some(&rtv), false, None);
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        let d3d12_vp = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        unsafe {
            self.command_list.RSSetViewports(&[d3d12_vp]);
        }
    }

    fn set_scissor_rect(&mut self, scissor_rect: &ScissorRect) {
        let d3d12_sr = RECT {
            left: scissor_rect.left,
            top: scissor_rect.top,
            right: scissor_rect.right,
            bottom: scissor_rect.bottom,
        };
        unsafe {
            self.command_list.RSSetScissorRects(&[d3d12_sr]);
        }
    }

    fn set_vertex_buffer(&mut self, buffer: &Buffer, slot: u32) {
        if let Some(vbv) = &buffer.vbv {
            unsafe {
                self.command_list.IASetVertexBuffers(slot, Some(&[*vbv]));
            }
        }
    }

    fn set_index_buffer(&mut self, buffer: &Buffer) {
        if let Some(ibv) = &buffer.ibv {
            unsafe {
                self.command_list.IASetIndexBuffer(Some(ibv));
            }
        }
    }

    fn set_render_pipeline(&mut self, pipeline: &RenderPipeline) {
        unsafe {
            self.command_list.SetGraphicsRootSignature(&pipeline.root_signature);
            self.command_list.SetPipelineState(&pipeline.pso);
            self.command_list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
        }
    }

    fn set_heap(&mut self, heap: &Heap) {
        unsafe {
            self.command_list.SetDescriptorHeaps(&[Some(heap.heap.clone())]);
        }
    }

    fn set_render_heap(&mut self, slot: u32, heap: &Heap, offset: usize) {
        unsafe {
            self.command_list.SetGraphicsRootDescriptorTable(slot, heap.gpu_handle(offset));
        }
    }

    fn push_constants<T: Sized>(&mut self, slot: u32, num_values: u32, dest_offset: u32, data: &[T]) {
        unsafe {
            self.command_list.SetGraphicsRoot32BitConstants(slot, num_values, data.as_ptr() as *const c_void, dest_offset);
        }
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32) {
        unsafe {
            self.command_list.DrawInstanced(vertex_count, instance_count, start_vertex, start_instance);
        }
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        unsafe {
            self.command_list.DrawIndexedInstanced(index_count, instance_count, start_index, base_vertex, start_instance);
        }
    }
}

impl SwapChain {
    fn get_backbuffer_texture_rtv(&self) -> Option<D3D12_CPU_DESCRIPTOR_HANDLE> {
        self.backbuffers.get(self.bb_index as usize).and_then(|bb| bb.rtv)
    }
}

impl super::Buffer<Device> for Buffer {
    fn update<T: Sized>(&mut self, offset: usize, data: &[T]) -> Result<(), Error> {
        let src = super::slice_as_u8_slice(data);
        let end = offset + src.len();
        if end > self.size_bytes {
            return Err(Error::Device(format!("buffer write {}..{} out of range {}", offset, end, self.size_bytes)));
        }
        unsafe {
            let mut mapped: *mut c_void = std::ptr::null_mut();
            self.resource.Map(0, None, Some(&mut mapped))?;
            std::ptr::copy_nonoverlapping(src.as_ptr(), (mapped as *mut u8).add(offset), src.len());
            self.resource.Unmap(0, None);
        }
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
