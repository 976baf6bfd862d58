/// Device limits enforced by the emulated GPU context.
#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Largest extent an image may have along any axis.
    pub max_image_dimension: u32,
    /// Largest number of workgroups a dispatch may request along any axis.
    pub max_workgroup_count: u32,
    /// Largest number of invocations in a single workgroup.
    pub max_workgroup_invocations: u32,
    /// Largest single image allocation, in bytes.
    pub max_allocation_bytes: usize,
}

impl Default for GpuConfig {
    fn default() -> Self {
        GpuConfig {
            max_image_dimension: 16384,
            max_workgroup_count: 65535,
            max_workgroup_invocations: 1024,
            max_allocation_bytes: 1 << 30,
        }
    }
}
