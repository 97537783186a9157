//! Buffer management for instance data, uniforms and staging
//!
//! [`Buffer`] is plain handle data. Whoever asked [`BufferManager`] for it owns
//! it and hands it back through [`BufferManager::destroy_buffer`] (or
//! [`Buffer::destroy`]) during teardown.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::render::backends::GpuDevice;
use crate::render::error::{VulkanError, VulkanResult};
use crate::render::utils::find_memory_type;

/// GPU buffer with its bound memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buffer {
    /// Buffer handle
    pub handle: vk::Buffer,
    /// Dedicated memory allocation
    pub memory: vk::DeviceMemory,
    /// Size in bytes
    pub size: vk::DeviceSize,
}

impl Buffer {
    /// Whether the buffer currently holds a live handle
    pub fn is_allocated(&self) -> bool {
        self.handle != vk::Buffer::null()
    }

    /// Destroy handle and memory, leaving both null
    ///
    /// Calling this twice is harmless.
    pub fn destroy(&mut self, device: &dyn GpuDevice) {
        if self.handle != vk::Buffer::null() {
            device.destroy_buffer(self.handle);
            self.handle = vk::Buffer::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory);
            self.memory = vk::DeviceMemory::null();
        }
    }

    fn check_range(&self, offset: vk::DeviceSize, len: usize) -> VulkanResult<()> {
        let end = offset.checked_add(len as vk::DeviceSize);
        match end {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{len} bytes at offset {offset} exceed buffer size {}",
                    self.size
                ),
            }),
        }
    }
}

/// A mapped range of a host-visible buffer
///
/// The memory is unmapped when the guard drops, so the pointer never outlives
/// the mapping.
pub struct MappedBuffer<'a> {
    device: &'a dyn GpuDevice,
    memory: vk::DeviceMemory,
    ptr: *mut u8,
    len: usize,
}

impl MappedBuffer<'_> {
    /// Mapped bytes
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the device mapped `len` bytes at `ptr` and they stay mapped until drop
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Mapped bytes, writable
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and the guard is borrowed mutably
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for MappedBuffer<'_> {
    fn drop(&mut self) {
        self.device.unmap_memory(self.memory);
    }
}

/// Allocates, fills, copies and destroys GPU buffers
pub struct BufferManager {
    device: Arc<dyn GpuDevice>,
}

impl BufferManager {
    /// Create a manager for `device`
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self { device }
    }

    /// Device this manager allocates from
    pub fn device(&self) -> &dyn GpuDevice {
        self.device.as_ref()
    }

    /// Create a buffer and bind a dedicated allocation with `memory_properties`
    ///
    /// Fails with [`VulkanError::NoSuitableMemoryType`] when the device has no
    /// memory type with the requested properties.
    pub fn allocate_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Buffer> {
        let device = self.device.as_ref();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let mut buffer = Buffer {
            handle: device.create_buffer(&buffer_info)?,
            memory: vk::DeviceMemory::null(),
            size,
        };

        let requirements = device.buffer_memory_requirements(buffer.handle);
        let allocated = find_memory_type(
            &device.capabilities().memory_properties,
            requirements.memory_type_bits,
            memory_properties,
        )
        .and_then(|memory_type_index| {
            let alloc_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(requirements.size.max(size))
                .memory_type_index(memory_type_index);
            device.allocate_memory(&alloc_info)
        })
        .and_then(|memory| {
            buffer.memory = memory;
            device.bind_buffer_memory(buffer.handle, memory, 0)
        });

        if let Err(e) = allocated {
            log::error!("Buffer Manager: failed to allocate {size} byte buffer: {e}");
            buffer.destroy(device);
            return Err(e);
        }

        Ok(buffer)
    }

    /// Map `len` bytes of `buffer` starting at `offset`
    pub fn map(&self, buffer: &Buffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<MappedBuffer<'_>> {
        buffer.check_range(offset, len)?;
        let ptr = self
            .device
            .map_memory(buffer.memory, offset, len as vk::DeviceSize)?;
        Ok(MappedBuffer {
            device: self.device.as_ref(),
            memory: buffer.memory,
            ptr,
            len,
        })
    }

    /// Copy `bytes` into host-visible `buffer` at `offset`
    ///
    /// Maps, copies and unmaps synchronously.
    pub fn upload_bytes(&self, buffer: &Buffer, bytes: &[u8], offset: vk::DeviceSize) -> VulkanResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut mapped = self.map(buffer, offset, bytes.len())?;
        mapped.as_mut_slice().copy_from_slice(bytes);
        Ok(())
    }

    /// Copy a slice of plain-old-data values into `buffer` at `offset`
    pub fn upload_data<T: Pod>(&self, buffer: &Buffer, data: &[T], offset: vk::DeviceSize) -> VulkanResult<()> {
        self.upload_bytes(buffer, bytemuck::cast_slice(data), offset)
    }

    /// Read `len` bytes back from host-visible `buffer` at `offset`
    pub fn read_data(&self, buffer: &Buffer, offset: vk::DeviceSize, len: usize) -> VulkanResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let mapped = self.map(buffer, offset, len)?;
        Ok(mapped.as_slice().to_vec())
    }

    /// Record a device-side copy of `size` bytes from `source` to `destination`
    ///
    /// The command buffer must already be recording. Nothing is submitted here.
    pub fn copy_data(
        &self,
        command_buffer: vk::CommandBuffer,
        source: &Buffer,
        destination: &Buffer,
        size: vk::DeviceSize,
        source_offset: vk::DeviceSize,
        destination_offset: vk::DeviceSize,
    ) {
        let region = vk::BufferCopy {
            src_offset: source_offset,
            dst_offset: destination_offset,
            size,
        };
        self.device
            .cmd_copy_buffer(command_buffer, source.handle, destination.handle, &[region]);
    }

    /// Free `buffer` and zero its handles
    pub fn destroy_buffer(&self, buffer: &mut Buffer) {
        buffer.destroy(self.device.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessDevice;
    use crate::render::utils::SingleTimeCommands;

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    fn manager() -> (Arc<HeadlessDevice>, BufferManager) {
        let device = Arc::new(HeadlessDevice::new(64, 64));
        let manager = BufferManager::new(device.clone());
        (device, manager)
    }

    #[test]
    fn test_upload_then_read_back_returns_same_bytes() {
        let (_device, manager) = manager();
        let mut buffer = manager
            .allocate_buffer(64, vk::BufferUsageFlags::TRANSFER_SRC, HOST)
            .unwrap();

        let data: Vec<u32> = (0..8).map(|i| i * 0x0101_0101).collect();
        manager.upload_data(&buffer, &data, 16).unwrap();

        let read = manager.read_data(&buffer, 16, 32).unwrap();
        assert_eq!(read, bytemuck::cast_slice::<u32, u8>(&data));

        manager.destroy_buffer(&mut buffer);
    }

    #[test]
    fn test_staging_round_trip_through_device_local_buffer() {
        let (device, manager) = manager();
        let pool = device.create_command_pool(vk::CommandPoolCreateFlags::empty()).unwrap();
        let mut staging = manager.allocate_buffer(32, vk::BufferUsageFlags::TRANSFER_SRC, HOST).unwrap();
        let mut local = manager
            .allocate_buffer(
                32,
                vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .unwrap();
        let mut readback = manager.allocate_buffer(32, vk::BufferUsageFlags::TRANSFER_DST, HOST).unwrap();

        let bytes: Vec<u8> = (0..32).collect();
        manager.upload_bytes(&staging, &bytes, 0).unwrap();

        let commands = SingleTimeCommands::begin(device.as_ref(), pool).unwrap();
        manager.copy_data(commands.handle(), &staging, &local, 32, 0, 0);
        manager.copy_data(commands.handle(), &local, &readback, 32, 0, 0);
        commands.submit().unwrap();

        assert_eq!(manager.read_data(&readback, 0, 32).unwrap(), bytes);

        for buffer in [&mut staging, &mut local, &mut readback] {
            manager.destroy_buffer(buffer);
        }
        device.destroy_command_pool(pool);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_upload_past_end_is_rejected() {
        let (_device, manager) = manager();
        let buffer = manager.allocate_buffer(8, vk::BufferUsageFlags::TRANSFER_SRC, HOST).unwrap();
        let result = manager.upload_bytes(&buffer, &[0; 8], 4);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (device, manager) = manager();
        let mut buffer = manager
            .allocate_buffer(16, vk::BufferUsageFlags::UNIFORM_BUFFER, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .unwrap();
        manager.destroy_buffer(&mut buffer);
        manager.destroy_buffer(&mut buffer);
        assert!(!buffer.is_allocated());
        assert_eq!(buffer.memory, vk::DeviceMemory::null());
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_missing_memory_type_fails_and_leaks_nothing() {
        let (device, manager) = manager();
        let result = manager.allocate_buffer(
            16,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
        );
        assert_eq!(result, Err(VulkanError::NoSuitableMemoryType));
        assert_eq!(device.live_object_count(), 0);
    }
}
