use zbus::{Result, proxy};
#[proxy(
    default_service = "com.canonical.skfpgad",
    interface = "com.canonical.skfpgad.control",
    default_path = "/com/canonical/skfpgad/control"
)]
pub trait Control {
    async fn open(&self) -> Result<String>;
    async fn close(&self) -> Result<String>;
    async fn set_timings(
        &self,
        slot: u8,
        setup: u32,
        pulse: u32,
        cycle: u32,
        mode: u32,
    ) -> Result<String>;
    async fn set_address_selector(&self, selector: &str) -> Result<String>;
    async fn set_word(&self, addr: u32, value: u16) -> Result<String>;
    async fn stream_write(&self, addr: u32, data: &[u8]) -> Result<u32>;
    async fn program_bitstream(&self, bitstream_path_str: &str) -> Result<u64>;
    async fn set_reset(&self, level: bool) -> Result<String>;
    async fn set_host_irq(&self, level: bool) -> Result<String>;
    async fn enable_fpga_irq(&self, enable: bool) -> Result<String>;

    async fn start_dma(
        &self,
        addr: u32,
        len: u32,
        direction: &str,
        synchronous: bool,
    ) -> Result<u32>;

    async fn map_memory(&self) -> Result<(u32, u32)>;
}
