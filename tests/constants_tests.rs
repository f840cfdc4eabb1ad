// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use camkit::constants::{BitratePreset, format_bitrate};

#[test]
fn test_bitrate_preset_values() {
    // Test that all presets exist (Low, Medium, High)
    assert_eq!(BitratePreset::ALL.len(), 3);
}

#[test]
fn test_bitrate_preset_ordering() {
    // Presets are ordered from lowest to highest quality
    let mut prev_bitrate = 0u32;
    for preset in BitratePreset::ALL {
        let bitrate = preset.bitrate_kbps(1080, 1920);
        assert!(
            bitrate >= prev_bitrate,
            "Presets should be ordered from lowest to highest"
        );
        prev_bitrate = bitrate;
    }
}

#[test]
fn test_bitrate_scales_with_resolution() {
    // Portrait capture sizes map to the same tiers as landscape
    let hd_bitrate = BitratePreset::Medium.bitrate_kbps(720, 1280);
    let fhd_bitrate = BitratePreset::Medium.bitrate_kbps(1080, 1920);
    let uhd_bitrate = BitratePreset::Medium.bitrate_kbps(2160, 3840);

    assert!(hd_bitrate < fhd_bitrate);
    assert!(fhd_bitrate < uhd_bitrate);
    assert_eq!(
        BitratePreset::Medium.bitrate_kbps(1080, 1920),
        BitratePreset::Medium.bitrate_kbps(1920, 1080)
    );
}

#[test]
fn test_bitrate_preset_display_names() {
    for preset in BitratePreset::ALL {
        let name = preset.display_name();
        assert!(
            !name.is_empty(),
            "Preset {:?} has empty display name",
            preset
        );
    }
}

#[test]
fn test_format_bitrate() {
    assert_eq!(format_bitrate(8000), "8 Mbps");
    assert_eq!(format_bitrate(2500), "2.5 Mbps");
}

#[test]
fn test_bitrate_table_edges() {
    assert_eq!(BitratePreset::Low.bitrate_kbps(480, 640), 1_000);
    assert_eq!(BitratePreset::Medium.bitrate_kbps(720, 1280), 5_000);
    assert_eq!(BitratePreset::High.bitrate_kbps(4096, 2160), 50_000);
    assert_eq!(BitratePreset::High.x264_preset(), "medium");
}
