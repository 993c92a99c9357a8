/// Command arguments for the SSD1680.
pub struct Flag;
impl Flag {
    // Driver Output Control (0x01), third byte
    pub const DRIVER_OUTPUT_GATE_SCAN_FROM_G0: u8 = 0x00;

    // Data Entry Mode (0x11)
    pub const DATA_ENTRY_INCRY_INCRX: u8 = 0x03; // Y increment, X increment

    // Deep Sleep Mode (0x10)
    pub const DEEP_SLEEP_MODE_1: u8 = 0x01;

    // Temperature Sensor Control (0x18)
    pub const INTERNAL_TEMP_SENSOR: u8 = 0x80;

    // Border Waveform Control (0x3C)
    pub const BORDER_WAVEFORM_WHITE: u8 = 0x01;
    pub const BORDER_WAVEFORM_FIXED_BITS: u8 = 0x04; // Follow LUT

    // Display Update Control 2 (0x22) sequences
    pub const DISPLAY_UPDATE_FULL: u8 = 0xF4; // Load temperature and full waveform
    pub const DISPLAY_UPDATE_PARTIAL: u8 = 0xFF; // Display mode 2 waveform
}
