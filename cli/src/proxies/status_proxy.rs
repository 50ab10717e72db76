use zbus::{Result, proxy};
#[proxy(
    default_service = "com.canonical.skfpgad",
    interface = "com.canonical.skfpgad.status",
    default_path = "/com/canonical/skfpgad/status"
)]
pub trait Status {
    async fn get_state(&self) -> Result<String>;
    async fn get_timings(&self, slot: u8) -> Result<(u32, u32, u32, u32)>;
    async fn get_word(&self, addr: u32) -> Result<u16>;
    async fn stream_read(&self, addr: u32, len: u32) -> Result<Vec<u8>>;
    async fn get_reset(&self) -> Result<bool>;
    async fn get_host_irq(&self) -> Result<bool>;
    async fn get_fpga_irq(&self) -> Result<bool>;
    async fn get_address_selector(&self) -> Result<String>;
    async fn get_board_info(&self) -> Result<Vec<(String, String)>>;

    #[zbus(signal)]
    fn dma_complete(
        &self,
        addr: u32,
        len: u32,
        direction: String,
        ok: bool,
        bytes: u32,
        detail: String,
    ) -> Result<()>;

    #[zbus(signal)]
    fn external_event(&self) -> Result<()>;
}
