//! Per-model descriptors and the USB product-id registry.
//!
//! Every supported instrument is described by a [`ModelDescriptor`]: endpoint
//! map, pixel geometry, integration-time bounds, raw-frame layout, dark-pixel
//! indices, trigger modes, decode quirks (XOR mask, byte reordering) and
//! capability flags.  Feature presence is declarative — the driver never
//! probes a device to discover capabilities beyond the USB descriptor and,
//! for FPGA-equipped models, one post-open register read.

/// Ocean Optics vendor ID.
pub const VENDOR_ID: u16 = 0x2457;

/// Bulk endpoint addresses for one model.
///
/// `primary_in` is the low-speed command/reply endpoint; the secondary
/// endpoints carry high-speed spectral data on models that have them.
#[derive(Debug, Clone, Copy)]
pub struct EndpointMap {
    pub primary_out: u8,
    pub primary_in: u8,
    pub secondary_in: Option<u8>,
    pub secondary_in2: Option<u8>,
}

/// FPGA-era models: out 0x01, in 0x81, high-speed 0x82, alternate 0x86.
const EP_FPGA: EndpointMap = EndpointMap {
    primary_out: 0x01,
    primary_in: 0x81,
    secondary_in: Some(0x82),
    secondary_in2: Some(0x86),
};

/// Legacy 2k-pixel models: out 0x02, in 0x87, high-speed 0x82.
const EP_LEGACY: EndpointMap = EndpointMap {
    primary_out: 0x02,
    primary_in: 0x87,
    secondary_in: Some(0x82),
    secondary_in2: None,
};

/// OBP models expose a single in/out endpoint pair.
const EP_OBP: EndpointMap = EndpointMap {
    primary_out: 0x01,
    primary_in: 0x81,
    secondary_in: None,
    secondary_in2: None,
};

/// Which request/response protocol the model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    /// Legacy byte-oriented protocol (one-byte opcodes, unframed replies).
    Ooi,
    /// Framed Ocean Binary Protocol (header/footer, flags, error codes).
    Obp,
}

/// Byte reordering applied to a raw frame before sample extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Samples arrive as consecutive little-endian words.
    None,
    /// Legacy 2k models interleave low/high bytes in 64-byte blocks.
    Interleaved64,
}

/// How spectral frames are read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumReadPath {
    /// Read `raw_frame_length` bytes from `primary_in`.
    Primary,
    /// FPGA dual data path: consult the cached USB-speed register.  At high
    /// speed (0x80) the first 2048 bytes arrive on `secondary_in2` and the
    /// remainder on `secondary_in`; at full speed the whole frame arrives
    /// on `secondary_in`.
    FpgaSpeedDependent,
}

/// Where the saturation value used for intensity normalization lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaturationSource {
    /// No stored saturation value; intensities are returned unscaled.
    None,
    /// A little-endian u16 inside an EEPROM slot.
    EepromSlot { slot: u8, offset: usize },
}

/// Declarative capability flags. Absent capabilities fail with
/// [`Error::Unsupported`](crate::Error::Unsupported) before any wire write.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub eeprom: bool,
    pub thermoelectric: bool,
    pub shutter: bool,
    pub strobe: bool,
    pub lamp: bool,
    pub nonlinearity: bool,
    pub wavelength_cal: bool,
}

/// Immutable per-model record. All times are in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub product_id: u16,
    pub endpoints: EndpointMap,
    pub protocol: ProtocolFamily,
    /// Number of decoded samples per frame.
    pub pixel_count: usize,
    /// On-the-wire frame size in bytes (including any trailing sync byte
    /// or leading metadata preamble).
    pub raw_frame_length: usize,
    pub integration_time_min: u32,
    pub integration_time_max: u32,
    /// Divisor applied to the requested microseconds before the wire write.
    pub integration_time_base: u32,
    pub max_pixel_value: f64,
    pub saturation: SaturationSource,
    /// Electrically shielded pixels, sorted and unique.
    pub dark_pixels: &'static [usize],
    pub trigger_modes: &'static [u8],
    /// XOR mask applied to every decoded 16-bit sample.
    pub xor_mask: u16,
    pub byte_order: ByteOrder,
    pub spectrum_path: SpectrumReadPath,
    /// Pixel-index offset used when evaluating the wavelength polynomial
    /// (-10 on the QE65000, which masks its edge pixels).
    pub wavelength_pixel_offset: i32,
    /// Set when the model decodes 32-bit samples behind a 32-byte metadata
    /// preamble (QEPRO extended spectrum).
    pub wide_pixels: bool,
    pub capabilities: Capabilities,
}

const CAPS_OOI: Capabilities = Capabilities {
    eeprom: true,
    thermoelectric: false,
    shutter: false,
    strobe: true,
    lamp: false,
    nonlinearity: true,
    wavelength_cal: true,
};

const CAPS_OBP: Capabilities = Capabilities {
    eeprom: false,
    thermoelectric: false,
    shutter: false,
    strobe: true,
    lamp: false,
    nonlinearity: true,
    wavelength_cal: true,
};

/// All supported models, keyed by product id.
///
/// Pixel counts and bounds follow the device datasheets; entries the
/// datasheets leave ambiguous are noted in DESIGN.md.
pub static MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        name: "USB2000",
        product_id: 0x1002,
        endpoints: EP_LEGACY,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 2048,
        raw_frame_length: 2048 * 2 + 1,
        integration_time_min: 3_000,
        integration_time_max: 65_535_000,
        integration_time_base: 1_000,
        max_pixel_value: 4095.0,
        saturation: SaturationSource::None,
        dark_pixels: &[
            2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23,
        ],
        trigger_modes: &[0, 1, 2, 3],
        xor_mask: 0x0000,
        byte_order: ByteOrder::Interleaved64,
        spectrum_path: SpectrumReadPath::Primary,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OOI,
    },
    ModelDescriptor {
        name: "HR2000",
        product_id: 0x100A,
        endpoints: EP_LEGACY,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 2048,
        raw_frame_length: 2048 * 2 + 1,
        integration_time_min: 3_000,
        integration_time_max: 65_535_000,
        integration_time_base: 1_000,
        max_pixel_value: 4095.0,
        saturation: SaturationSource::None,
        dark_pixels: &[
            2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23,
        ],
        trigger_modes: &[0, 1, 2, 3],
        xor_mask: 0x0000,
        byte_order: ByteOrder::Interleaved64,
        spectrum_path: SpectrumReadPath::Primary,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OOI,
    },
    ModelDescriptor {
        name: "HR4000",
        product_id: 0x1012,
        endpoints: EP_FPGA,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 3840,
        raw_frame_length: 3840 * 2 + 1,
        integration_time_min: 10,
        integration_time_max: 655_350_000,
        integration_time_base: 1,
        max_pixel_value: 16383.0,
        saturation: SaturationSource::None,
        dark_pixels: &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        trigger_modes: &[0, 1, 2, 3, 4],
        xor_mask: 0x2000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::FpgaSpeedDependent,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OOI,
    },
    ModelDescriptor {
        name: "HR2000PLUS",
        product_id: 0x1016,
        endpoints: EP_FPGA,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 2048,
        raw_frame_length: 2048 * 2 + 1,
        integration_time_min: 1_000,
        integration_time_max: 655_350_000,
        integration_time_base: 1,
        max_pixel_value: 16383.0,
        saturation: SaturationSource::None,
        dark_pixels: &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        trigger_modes: &[0, 1, 2, 3, 4],
        xor_mask: 0x2000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::FpgaSpeedDependent,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OOI,
    },
    ModelDescriptor {
        name: "USB2000PLUS",
        product_id: 0x101E,
        endpoints: EP_FPGA,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 2048,
        raw_frame_length: 2048 * 2 + 1,
        integration_time_min: 1_000,
        integration_time_max: 655_350_000,
        integration_time_base: 1,
        max_pixel_value: 65535.0,
        saturation: SaturationSource::EepromSlot { slot: 17, offset: 6 },
        dark_pixels: &[6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20],
        trigger_modes: &[0, 1, 2, 3, 4],
        xor_mask: 0x0000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::FpgaSpeedDependent,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OOI,
    },
    ModelDescriptor {
        name: "USB4000",
        product_id: 0x1022,
        endpoints: EP_FPGA,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 3648,
        raw_frame_length: 3648 * 2 + 1,
        integration_time_min: 10,
        integration_time_max: 655_350_000,
        integration_time_base: 1,
        max_pixel_value: 65535.0,
        saturation: SaturationSource::EepromSlot { slot: 17, offset: 6 },
        dark_pixels: &[5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
        trigger_modes: &[0, 1, 2, 3, 4],
        xor_mask: 0x0000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::FpgaSpeedDependent,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OOI,
    },
    ModelDescriptor {
        name: "QE65000",
        product_id: 0x1028,
        endpoints: EP_FPGA,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 1280,
        raw_frame_length: 1280 * 2 + 1,
        integration_time_min: 8_000,
        integration_time_max: 1_600_000_000,
        integration_time_base: 1_000,
        max_pixel_value: 65535.0,
        saturation: SaturationSource::None,
        // Edge pixels are optically masked; the wavelength polynomial is
        // evaluated with a -10 pixel offset instead.
        dark_pixels: &[0, 1, 2, 3],
        trigger_modes: &[0, 1, 2, 3, 4],
        xor_mask: 0x0000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::FpgaSpeedDependent,
        wavelength_pixel_offset: -10,
        wide_pixels: false,
        capabilities: Capabilities {
            thermoelectric: true,
            shutter: true,
            ..CAPS_OOI
        },
    },
    ModelDescriptor {
        name: "MAYA2000PRO",
        product_id: 0x102A,
        endpoints: EP_FPGA,
        protocol: ProtocolFamily::Ooi,
        pixel_count: 2304,
        raw_frame_length: 2304 * 2 + 1,
        integration_time_min: 7_200,
        integration_time_max: 65_000_000,
        integration_time_base: 1,
        max_pixel_value: 64000.0,
        saturation: SaturationSource::EepromSlot { slot: 17, offset: 6 },
        dark_pixels: &[0, 1, 2, 3, 4, 5, 6, 7],
        trigger_modes: &[0, 1, 2],
        xor_mask: 0x0000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::FpgaSpeedDependent,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OOI,
    },
    ModelDescriptor {
        name: "STS",
        product_id: 0x4000,
        endpoints: EP_OBP,
        protocol: ProtocolFamily::Obp,
        pixel_count: 1024,
        raw_frame_length: 1024 * 2,
        integration_time_min: 10,
        integration_time_max: 85_000_000,
        integration_time_base: 1,
        max_pixel_value: 16383.0,
        saturation: SaturationSource::None,
        dark_pixels: &[],
        trigger_modes: &[0, 1, 2],
        xor_mask: 0x0000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::Primary,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: CAPS_OBP,
    },
    ModelDescriptor {
        name: "QEPRO",
        product_id: 0x4004,
        endpoints: EP_OBP,
        protocol: ProtocolFamily::Obp,
        pixel_count: 1044,
        // 32-byte metadata preamble + 32-bit samples.
        raw_frame_length: 32 + 1044 * 4,
        integration_time_min: 8_000,
        integration_time_max: 1_600_000_000,
        integration_time_base: 1,
        max_pixel_value: 200_000.0,
        saturation: SaturationSource::None,
        dark_pixels: &[0, 1, 2, 3],
        trigger_modes: &[0, 1, 2, 3],
        xor_mask: 0x0000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::Primary,
        wavelength_pixel_offset: 0,
        wide_pixels: true,
        capabilities: Capabilities {
            thermoelectric: true,
            shutter: true,
            ..CAPS_OBP
        },
    },
    ModelDescriptor {
        name: "VENTANA",
        product_id: 0x5000,
        endpoints: EP_OBP,
        protocol: ProtocolFamily::Obp,
        pixel_count: 1024,
        raw_frame_length: 1024 * 2,
        integration_time_min: 22_000,
        integration_time_max: 60_000_000,
        integration_time_base: 1,
        max_pixel_value: 65535.0,
        saturation: SaturationSource::None,
        dark_pixels: &[],
        trigger_modes: &[0, 1, 2],
        xor_mask: 0x0000,
        byte_order: ByteOrder::None,
        spectrum_path: SpectrumReadPath::Primary,
        wavelength_pixel_offset: 0,
        wide_pixels: false,
        capabilities: Capabilities {
            thermoelectric: true,
            lamp: true,
            strobe: false,
            ..CAPS_OBP
        },
    },
];

/// Look up the descriptor for a USB product id.
pub fn lookup(product_id: u16) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.product_id == product_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_bounds_are_ordered() {
        for m in MODELS {
            assert!(
                m.integration_time_min < m.integration_time_max,
                "{}: min must be below max",
                m.name
            );
            assert!(m.integration_time_base > 0, "{}: zero base", m.name);
        }
    }

    #[test]
    fn pixel_geometry_is_sane() {
        for m in MODELS {
            assert!(m.pixel_count > 0, "{}: no pixels", m.name);
            let sample_bytes = if m.wide_pixels { 4 } else { 2 };
            assert!(
                m.raw_frame_length >= m.pixel_count * sample_bytes,
                "{}: frame shorter than pixel data",
                m.name
            );
        }
    }

    #[test]
    fn dark_pixels_are_sorted_unique_and_in_range() {
        for m in MODELS {
            assert!(
                m.dark_pixels.windows(2).all(|w| w[0] < w[1]),
                "{}: dark pixels not strictly increasing",
                m.name
            );
            assert!(
                m.dark_pixels.iter().all(|&i| i < m.pixel_count),
                "{}: dark pixel out of range",
                m.name
            );
            // strict subset
            assert!(m.dark_pixels.len() < m.pixel_count, "{}", m.name);
        }
    }

    #[test]
    fn endpoint_maps_have_primary_pair() {
        for m in MODELS {
            assert_ne!(m.endpoints.primary_out, 0, "{}", m.name);
            assert_ne!(m.endpoints.primary_in, 0, "{}", m.name);
            if m.spectrum_path == SpectrumReadPath::FpgaSpeedDependent {
                assert!(m.endpoints.secondary_in.is_some(), "{}", m.name);
                assert!(m.endpoints.secondary_in2.is_some(), "{}", m.name);
            }
        }
    }

    #[test]
    fn product_ids_are_unique() {
        for (i, a) in MODELS.iter().enumerate() {
            for b in &MODELS[i + 1..] {
                assert_ne!(a.product_id, b.product_id);
            }
        }
    }

    #[test]
    fn lookup_finds_known_models() {
        assert_eq!(lookup(0x101E).unwrap().name, "USB2000PLUS");
        assert_eq!(lookup(0x4004).unwrap().name, "QEPRO");
        assert!(lookup(0xFFFF).is_none());
    }
}
