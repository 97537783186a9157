//! Built-in meshes uploaded to device-local vertex and index buffers

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

use crate::render::backends::GpuDevice;
use crate::render::context::GraphicsContext;
use crate::render::error::{VulkanError, VulkanResult};
use crate::render::resources::buffer::{Buffer, BufferManager};
use crate::render::types::{MeshAssetType, Vertex};
use crate::render::utils::SingleTimeCommands;

/// CPU-side geometry
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    /// Name used in logs
    pub name: String,
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// 32-bit indices into `vertices`
    pub indices: Vec<u32>,
}

/// GPU buffers of one uploaded mesh
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshGpuData {
    /// Device-local vertex buffer
    pub vertex_buffer: Buffer,
    /// Number of vertices
    pub vertex_count: u32,
    /// Device-local `u32` index buffer
    pub index_buffer: Buffer,
    /// Number of indices
    pub index_count: u32,
}

const QUAD_UVS: [[f32; 2]; 6] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];

/// Two triangles over the corners `[a, b, c, d]`, wound a-b-c and c-d-a
fn face(corners: [[f32; 3]; 4], normal: [f32; 3]) -> impl Iterator<Item = Vertex> {
    let [a, b, c, d] = corners;
    [a, b, c, c, d, a]
        .into_iter()
        .zip(QUAD_UVS)
        .map(move |(position, uv)| Vertex::new(position, normal, uv))
}

fn sequential_indices(count: usize) -> Vec<u32> {
    (0..count as u32).collect()
}

/// Unit quad in the XY plane facing -Z
pub fn quad_asset() -> MeshAsset {
    let vertices: Vec<Vertex> = face(
        [[-0.5, 0.5, 0.0], [0.5, 0.5, 0.0], [0.5, -0.5, 0.0], [-0.5, -0.5, 0.0]],
        [0.0, 0.0, -1.0],
    )
    .collect();

    MeshAsset {
        name: "Quad".to_string(),
        indices: sequential_indices(vertices.len()),
        vertices,
    }
}

/// Unit cube centered on the origin, six faces of two triangles each
pub fn cube_asset() -> MeshAsset {
    let faces = [
        // +Z
        (
            [[0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5]],
            [0.0, 0.0, 1.0],
        ),
        // -Z
        (
            [[-0.5, 0.5, -0.5], [0.5, 0.5, -0.5], [0.5, -0.5, -0.5], [-0.5, -0.5, -0.5]],
            [0.0, 0.0, -1.0],
        ),
        // +X
        (
            [[0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5], [0.5, -0.5, -0.5]],
            [1.0, 0.0, 0.0],
        ),
        // -X
        (
            [[-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5]],
            [-1.0, 0.0, 0.0],
        ),
        // +Y
        (
            [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]],
            [0.0, 1.0, 0.0],
        ),
        // -Y
        (
            [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
            [0.0, -1.0, 0.0],
        ),
    ];

    let vertices: Vec<Vertex> = faces
        .into_iter()
        .flat_map(|(corners, normal)| face(corners, normal))
        .collect();

    MeshAsset {
        name: "Cube".to_string(),
        indices: sequential_indices(vertices.len()),
        vertices,
    }
}

/// Owns the uploaded meshes and their buffers
pub struct MeshManager {
    buffers: BufferManager,
    meshes: HashMap<MeshAssetType, (MeshAsset, MeshGpuData)>,
}

impl MeshManager {
    /// Create an empty manager for `device`
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            buffers: BufferManager::new(device),
            meshes: HashMap::new(),
        }
    }

    /// Upload the quad and the cube
    pub fn load_builtin_meshes(&mut self, context: &GraphicsContext) -> VulkanResult<()> {
        self.load_mesh_asset(context, MeshAssetType::Quad, quad_asset())?;
        self.load_mesh_asset(context, MeshAssetType::Cube, cube_asset())
    }

    /// Upload `asset` and store it under `mesh_type`, replacing any previous mesh
    pub fn load_mesh_asset(
        &mut self,
        context: &GraphicsContext,
        mesh_type: MeshAssetType,
        asset: MeshAsset,
    ) -> VulkanResult<()> {
        let gpu_data = self.upload_mesh_to_gpu(context, &asset)?;
        log::info!("Mesh Manager: Loading Asset \"{}\"", asset.name);

        if let Some((_, mut previous)) = self.meshes.insert(mesh_type, (asset, gpu_data)) {
            self.buffers.destroy_buffer(&mut previous.vertex_buffer);
            self.buffers.destroy_buffer(&mut previous.index_buffer);
        }
        Ok(())
    }

    /// Buffers of `mesh_type`, if loaded
    pub fn gpu_data(&self, mesh_type: MeshAssetType) -> Option<&MeshGpuData> {
        self.meshes.get(&mesh_type).map(|(_, gpu_data)| gpu_data)
    }

    /// CPU geometry of `mesh_type`, if loaded
    pub fn asset(&self, mesh_type: MeshAssetType) -> Option<&MeshAsset> {
        self.meshes.get(&mesh_type).map(|(asset, _)| asset)
    }

    /// Stage vertices and indices and copy them into new device-local buffers
    ///
    /// The staging buffers are released whether or not the copy succeeds.
    pub fn upload_mesh_to_gpu(&self, context: &GraphicsContext, asset: &MeshAsset) -> VulkanResult<MeshGpuData> {
        if asset.vertices.is_empty() || asset.indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("mesh \"{}\" has no geometry", asset.name),
            });
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&asset.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&asset.indices);

        let mut gpu_data = MeshGpuData {
            vertex_count: asset.vertices.len() as u32,
            index_count: asset.indices.len() as u32,
            ..MeshGpuData::default()
        };
        let mut vertex_staging = Buffer::default();
        let mut index_staging = Buffer::default();

        let result = self.stage_and_copy(
            context,
            vertex_bytes,
            index_bytes,
            &mut gpu_data,
            &mut vertex_staging,
            &mut index_staging,
        );

        self.buffers.destroy_buffer(&mut vertex_staging);
        self.buffers.destroy_buffer(&mut index_staging);

        if let Err(e) = result {
            self.buffers.destroy_buffer(&mut gpu_data.vertex_buffer);
            self.buffers.destroy_buffer(&mut gpu_data.index_buffer);
            return Err(e);
        }
        Ok(gpu_data)
    }

    fn stage_and_copy(
        &self,
        context: &GraphicsContext,
        vertex_bytes: &[u8],
        index_bytes: &[u8],
        gpu_data: &mut MeshGpuData,
        vertex_staging: &mut Buffer,
        index_staging: &mut Buffer,
    ) -> VulkanResult<()> {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let vertex_size = vertex_bytes.len() as vk::DeviceSize;
        let index_size = index_bytes.len() as vk::DeviceSize;

        gpu_data.vertex_buffer = self.buffers.allocate_buffer(
            vertex_size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        gpu_data.index_buffer = self.buffers.allocate_buffer(
            index_size,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        *vertex_staging = self
            .buffers
            .allocate_buffer(vertex_size, vk::BufferUsageFlags::TRANSFER_SRC, host)?;
        *index_staging = self
            .buffers
            .allocate_buffer(index_size, vk::BufferUsageFlags::TRANSFER_SRC, host)?;

        self.buffers.upload_bytes(vertex_staging, vertex_bytes, 0)?;
        self.buffers.upload_bytes(index_staging, index_bytes, 0)?;

        let commands = SingleTimeCommands::begin(self.buffers.device(), context.command_pool)?;
        self.buffers
            .copy_data(commands.handle(), vertex_staging, &gpu_data.vertex_buffer, vertex_size, 0, 0);
        self.buffers
            .copy_data(commands.handle(), index_staging, &gpu_data.index_buffer, index_size, 0, 0);
        commands.submit()
    }
}

impl Drop for MeshManager {
    fn drop(&mut self) {
        for (_, gpu_data) in self.meshes.values_mut() {
            gpu_data.vertex_buffer.destroy(self.buffers.device());
            gpu_data.index_buffer.destroy(self.buffers.device());
        }
        self.meshes.clear();
    }
}
