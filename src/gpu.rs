// SPDX-License-Identifier: AGPL-3.0-only

//! wgpu-backed kernel execution for the batched SpMV workload.
//!
//! Creates a wgpu compute device and implements the [`KernelQueue`] seam on
//! top of it: shared read-only matrix/input buffers, one output buffer per
//! run, one compute-pass submission per batch with the submission index as
//! the completion event.
//!
//! ## Adapter selection
//!
//! Set `RIFFLE_GPU_ADAPTER` to target a specific GPU:
//!
//! | Value | Behavior |
//! |-------|----------|
//! | `auto` | prefer a discrete adapter, else first available |
//! | `0`, `1`, … | select adapter by enumeration index |
//! | substring | case-insensitive name match (e.g. `"titan"`, `"4070"`) |
//! | *(unset)* | same as `auto` |
//!
//! The workload is f32 throughout, so no optional device features are
//! required and any compute-capable adapter qualifies.

use crate::csr::DeviceCsr;
use crate::dispatch::{BatchDispatch, KernelQueue};
use crate::error::RiffleError;

/// Summary of a discovered GPU adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Enumeration index (stable within a single run).
    pub index: usize,
    /// Adapter name as reported by the driver.
    pub name: String,
    /// Driver name (e.g. `"NVIDIA"`, `"NVK"`, `"radv"`).
    pub driver: String,
    /// Adapter device type (discrete, integrated, software, etc.).
    pub device_type: wgpu::DeviceType,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.device_type {
            wgpu::DeviceType::DiscreteGpu => "discrete",
            wgpu::DeviceType::IntegratedGpu => "integrated",
            wgpu::DeviceType::VirtualGpu => "virtual",
            wgpu::DeviceType::Cpu => "cpu",
            wgpu::DeviceType::Other => "other",
        };
        write!(f, "[{}] {} ({}, {})", self.index, self.name, self.driver, kind)
    }
}

/// GPU context for the SpMV workload.
pub struct GpuContext {
    pub adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuContext {
    /// Access the underlying wgpu Device.
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Access the underlying wgpu Queue.
    pub const fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Create a wgpu instance with the configured backend.
    fn create_instance() -> wgpu::Instance {
        let backends = match std::env::var("RIFFLE_WGPU_BACKEND").as_deref() {
            Ok("vulkan") => wgpu::Backends::VULKAN,
            Ok("metal") => wgpu::Backends::METAL,
            Ok("dx12") => wgpu::Backends::DX12,
            _ => wgpu::Backends::all(),
        };
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        })
    }

    /// Enumerate all available GPU adapters.
    pub fn enumerate_adapters() -> Vec<AdapterInfo> {
        let instance = Self::create_instance();
        instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .enumerate()
            .map(|(i, adapter)| {
                let info = adapter.get_info();
                AdapterInfo {
                    index: i,
                    name: info.name.clone(),
                    driver: info.driver.clone(),
                    device_type: info.device_type,
                }
            })
            .collect()
    }

    /// Create the compute device, honoring `RIFFLE_GPU_ADAPTER`.
    ///
    /// # Errors
    ///
    /// [`RiffleError::NoAdapter`] when nothing matches,
    /// [`RiffleError::DeviceCreation`] when the device request fails.
    pub async fn new() -> Result<Self, RiffleError> {
        let selector = std::env::var("RIFFLE_GPU_ADAPTER")
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let instance = Self::create_instance();
        let adapters: Vec<wgpu::Adapter> = instance.enumerate_adapters(wgpu::Backends::all());
        if adapters.is_empty() {
            return Err(RiffleError::NoAdapter);
        }

        let adapter = if selector.is_empty() || selector == "auto" {
            // Prefer a discrete adapter, else take the first
            let mut chosen: Option<wgpu::Adapter> = None;
            let mut fallback: Option<wgpu::Adapter> = None;
            for a in adapters {
                if a.get_info().device_type == wgpu::DeviceType::DiscreteGpu && chosen.is_none() {
                    chosen = Some(a);
                } else if fallback.is_none() {
                    fallback = Some(a);
                }
            }
            chosen.or(fallback).ok_or(RiffleError::NoAdapter)?
        } else if let Ok(idx) = selector.parse::<usize>() {
            if idx < adapters.len() {
                adapters
                    .into_iter()
                    .nth(idx)
                    .ok_or(RiffleError::NoAdapter)?
            } else {
                // Numeric value exceeds adapter count; treat as name substring
                adapters
                    .into_iter()
                    .find(|a| a.get_info().name.to_ascii_lowercase().contains(&selector))
                    .ok_or_else(|| {
                        RiffleError::DeviceCreation(format!(
                            "No adapter matching '{selector}' (tried as index {idx} and name)"
                        ))
                    })?
            }
        } else {
            adapters
                .into_iter()
                .find(|a| a.get_info().name.to_ascii_lowercase().contains(&selector))
                .ok_or_else(|| {
                    RiffleError::DeviceCreation(format!("No adapter matching '{selector}'"))
                })?
        };

        let adapter_name = adapter.get_info().name.clone();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("riffle spmv device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| RiffleError::DeviceCreation(e.to_string()))?;

        Ok(Self {
            adapter_name,
            device,
            queue,
        })
    }

    /// Print all available adapters to stdout.
    pub fn print_available_adapters() {
        let adapters = Self::enumerate_adapters();
        println!("  Available GPU adapters:");
        for info in &adapters {
            println!("    {info}");
        }
        if adapters.is_empty() {
            println!("    (none found)");
        }
    }

    /// Create a compute pipeline from WGSL shader source.
    pub fn create_pipeline(&self, shader_source: &str, label: &str) -> wgpu::ComputePipeline {
        let shader_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(shader_source.into()),
            });

        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &shader_module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    }

    /// Create a read-only storage buffer from f32 data.
    pub fn create_f32_buffer(&self, data: &[f32], label: &str) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
    }

    /// Create a read-only storage buffer from u32 data.
    pub fn create_u32_buffer(&self, data: &[u32], label: &str) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
    }

    /// Create a read-write storage buffer initialized from f32 data.
    pub fn create_f32_io_buffer(&self, data: &[f32], label: &str) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Create a uniform buffer from raw bytes.
    pub fn create_uniform_buffer(&self, data: &[u8], label: &str) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Create a staging buffer for reading results back to the CPU.
    pub fn create_staging_buffer(&self, size: usize, label: &str) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a bind group from a pipeline and ordered buffer slice.
    ///
    /// Each buffer is bound at binding index 0, 1, 2, ... in order.
    pub fn create_bind_group(
        &self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let layout = pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bind_group"),
            layout: &layout,
            entries: &entries,
        })
    }

    /// Read back f32 data from a GPU buffer via staging copy.
    ///
    /// # Errors
    ///
    /// [`RiffleError::Kernel`] if the map callback fails or its channel is
    /// dropped.
    pub fn read_back_f32(
        &self,
        buffer: &wgpu::Buffer,
        count: usize,
    ) -> Result<Vec<f32>, RiffleError> {
        let staging = self.create_staging_buffer(count * 4, "readback");
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, (count * 4) as u64);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RiffleError::Kernel("GPU map callback: channel recv failed".into()))?
            .map_err(|e| RiffleError::Kernel(format!("GPU buffer mapping: {e}")))?;

        let data = slice.get_mapped_range();
        let result: Vec<f32> = data
            .chunks_exact(4)
            .map(|chunk| {
                let bytes: [u8; 4] = chunk
                    .try_into()
                    .expect("chunks_exact(4) guarantees 4-byte slices");
                f32::from_le_bytes(bytes)
            })
            .collect();
        drop(data);
        staging.unmap();
        Ok(result)
    }
}

/// WGSL compute shader for one batch of the strided-scatter CSR SpMV:
/// `y[row] += Σ vals[k] * x[col_idx[k]]` over the rows one thread covers.
///
/// Each thread resolves its grid position from the flat invocation id,
/// starts at `row_start + grid_row * grid_width * rows_per_thread +
/// grid_col`, and walks the stride table; rows at or beyond `max_rows` are
/// skipped. Distinct threads cover distinct rows, so writes never race.
///
/// ## Binding layout
///
/// | Binding | Type | Content |
/// |---------|------|---------|
/// | 0 | uniform | [`BatchParams`] |
/// | 1 | storage, read | `row_ptr: array<u32>` |
/// | 2 | storage, read | `col_idx: array<u32>` (bias-shifted) |
/// | 3 | storage, read | `vals: array<f32>` |
/// | 4 | storage, read | `x: array<f32>` (bias slot at 0) |
/// | 5 | storage, read | `strides: array<u32>` |
/// | 6 | storage, read_write | `y: array<f32>` |
///
/// ## Dispatch
///
/// `ceil(thread_count / 64)` workgroups of 64 threads.
pub const WGSL_SPMV_CSR_BATCH: &str = r"
struct Params {
    row_start: u32,
    thread_count: u32,
    grid_width: u32,
    max_rows: u32,
    rows_per_thread: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> row_ptr: array<u32>;
@group(0) @binding(2) var<storage, read> col_idx: array<u32>;
@group(0) @binding(3) var<storage, read> vals: array<f32>;
@group(0) @binding(4) var<storage, read> x_vec: array<f32>;
@group(0) @binding(5) var<storage, read> strides: array<u32>;
@group(0) @binding(6) var<storage, read_write> y_vec: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let tid = gid.x;
    if tid >= params.thread_count {
        return;
    }

    let grid_col = tid % params.grid_width;
    let grid_row = tid / params.grid_width;
    let base = params.row_start + grid_row * params.grid_width * params.rows_per_thread + grid_col;

    for (var i = 0u; i < params.rows_per_thread; i = i + 1u) {
        let row = base + strides[i];
        if row < params.max_rows {
            let lo = row_ptr[row];
            let hi = row_ptr[row + 1u];
            var sum: f32 = 0.0;
            for (var k = lo; k < hi; k = k + 1u) {
                sum = sum + vals[k] * x_vec[col_idx[k]];
            }
            y_vec[row] = y_vec[row] + sum;
        }
    }
}
";

/// Uniform parameter block for one batch dispatch.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BatchParams {
    row_start: u32,
    thread_count: u32,
    grid_width: u32,
    max_rows: u32,
    rows_per_thread: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}

/// [`KernelQueue`] over a [`GpuContext`].
///
/// The matrix and input buffers are uploaded once and shared read-only
/// across runs and batches; each run owns its output buffer from creation
/// through read-back. Events are wgpu submission indices; waiting on one is
/// a blocking driver wait, not a poll loop.
pub struct GpuQueue<'a> {
    gpu: &'a GpuContext,
    pipeline: wgpu::ComputePipeline,
    row_ptr_buf: wgpu::Buffer,
    col_idx_buf: wgpu::Buffer,
    values_buf: wgpu::Buffer,
    x_buf: wgpu::Buffer,
    y_bufs: Vec<wgpu::Buffer>,
    y_len: usize,
}

impl<'a> GpuQueue<'a> {
    /// Upload the staged matrix, the shared input vector, and `num_runs`
    /// copies of the initial output vector.
    #[must_use]
    pub fn new(
        gpu: &'a GpuContext,
        device: &DeviceCsr,
        x: &[f32],
        y_initial: &[f32],
        num_runs: usize,
    ) -> Self {
        let pipeline = gpu.create_pipeline(WGSL_SPMV_CSR_BATCH, "spmv_csr_batch");
        let y_bufs = (0..num_runs)
            .map(|i| gpu.create_f32_io_buffer(y_initial, &format!("y_vec_{i}")))
            .collect();

        Self {
            gpu,
            pipeline,
            row_ptr_buf: gpu.create_u32_buffer(&device.row_ptr, "row_ptr"),
            col_idx_buf: gpu.create_u32_buffer(&device.col_idx, "col_idx"),
            values_buf: gpu.create_f32_buffer(&device.values, "values"),
            x_buf: gpu.create_f32_buffer(x, "x_vec"),
            y_bufs,
            y_len: y_initial.len(),
        }
    }
}

impl KernelQueue for GpuQueue<'_> {
    type Event = wgpu::SubmissionIndex;

    fn enqueue(
        &mut self,
        run: usize,
        dispatch: &BatchDispatch<'_>,
    ) -> Result<Self::Event, RiffleError> {
        let params = BatchParams {
            row_start: dispatch.row_start,
            thread_count: dispatch.thread_count,
            grid_width: dispatch.grid_width,
            max_rows: dispatch.max_rows,
            rows_per_thread: dispatch.strides.len() as u32,
            pad0: 0,
            pad1: 0,
            pad2: 0,
        };
        let params_buf = self
            .gpu
            .create_uniform_buffer(bytemuck::bytes_of(&params), "batch_params");
        let strides_buf = self.gpu.create_u32_buffer(dispatch.strides, "strides");

        let bind_group = self.gpu.create_bind_group(
            &self.pipeline,
            &[
                &params_buf,
                &self.row_ptr_buf,
                &self.col_idx_buf,
                &self.values_buf,
                &self.x_buf,
                &strides_buf,
                &self.y_bufs[run],
            ],
        );

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("spmv_batch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("spmv_batch_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dispatch.thread_count.div_ceil(64), 1, 1);
        }
        Ok(self.gpu.queue().submit(std::iter::once(encoder.finish())))
    }

    fn wait(&mut self, event: Self::Event) -> Result<(), RiffleError> {
        self.gpu
            .device()
            .poll(wgpu::Maintain::WaitForSubmissionIndex(event));
        Ok(())
    }

    fn read_back(&mut self, run: usize) -> Result<Vec<f32>, RiffleError> {
        self.gpu.read_back_f32(&self.y_bufs[run], self.y_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pure helper: convert f32 slice to bytes (matches buffer upload logic)
    fn f32_to_bytes(data: &[f32]) -> Vec<u8> {
        data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Pure helper: convert bytes back to f32 (matches readback logic)
    fn bytes_to_f32(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(4)
            .map(|chunk| {
                let bytes: [u8; 4] = chunk.try_into().expect("4-byte f32 chunk");
                f32::from_le_bytes(bytes)
            })
            .collect()
    }

    #[test]
    fn f32_byte_roundtrip() {
        let original = vec![0.0, 1.0, -1.0, std::f32::consts::PI, f32::INFINITY];
        let bytes = f32_to_bytes(&original);
        assert_eq!(bytes.len(), 20);
        let recovered = bytes_to_f32(&bytes);
        assert_eq!(original, recovered);
    }

    #[test]
    fn batch_params_is_32_bytes() {
        assert_eq!(std::mem::size_of::<BatchParams>(), 32);
    }

    #[test]
    fn shader_declares_all_bindings() {
        for binding in 0..=6 {
            assert!(WGSL_SPMV_CSR_BATCH.contains(&format!("@binding({binding})")));
        }
    }

    #[test]
    #[ignore = "requires GPU"]
    fn gpu_queue_matches_cpu_reference() {
        use crate::csr::CsrMatrix;
        use crate::dispatch::{run_plan, CpuQueue};
        use crate::plan::{BatchPlan, GridConfig};
        use crate::vectors::OWORD_ALIGNMENT;

        let m = CsrMatrix {
            num_rows: 5,
            num_cols: 5,
            num_nonzeros: 5,
            row_ptr: vec![0, 1, 2, 3, 4, 5],
            col_idx: vec![0, 1, 2, 3, 4],
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0],
        };
        let device = m.device_arrays(OWORD_ALIGNMENT);
        let x = vec![0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0];
        let y0 = vec![0.0; 8];
        let grid = GridConfig {
            width: 2,
            height_multiplier: 1,
            rows_per_thread: 2,
        };
        let plan = BatchPlan::build(5, &grid);

        let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
        let gpu = rt.block_on(GpuContext::new()).expect("GPU");
        let mut gpu_queue = GpuQueue::new(&gpu, &device, &x, &y0, 2);
        let gpu_out = run_plan(&mut gpu_queue, &plan, &grid, 5, 2).expect("gpu run");

        let mut cpu_queue = CpuQueue::new(&device, &x, &y0, 2);
        let cpu_out = run_plan(&mut cpu_queue, &plan, &grid, 5, 2).expect("cpu run");

        assert_eq!(gpu_out, cpu_out);
    }
}
