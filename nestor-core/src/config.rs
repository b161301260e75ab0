/// Console options chosen by the host before power-on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NesConfig {
    /// Start execution here instead of at the reset vector. CPU test ROMs
    /// such as nestest expect to be entered at a fixed address.
    pub start_address: Option<u16>,
    /// Log every executed instruction at trace level.
    pub trace_instructions: bool,
}

impl NesConfig {
    pub fn with_start_address(mut self, addr: u16) -> Self {
        self.start_address = Some(addr);
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.trace_instructions = enabled;
        self
    }
}
