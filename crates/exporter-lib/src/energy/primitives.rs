//! Power and unit-conversion primitives
//!
//! Best-effort coefficients assembled from public datacenter power
//! studies. Every formula here is pure; shaping factors (replication,
//! erasure-coding overhead) are applied by the per-kind calculations.

use crate::models::StorageMedia;

/// Average DRAM draw per GiB, in watts.
const MEMORY_WATTS_PER_GB: f64 = 0.392;

/// Spinning disk draw per TiB stored, in watts.
const HDD_WATTS_PER_TB: f64 = 0.65;

/// Flash storage draw per TiB stored, in watts.
const SSD_WATTS_PER_TB: f64 = 1.2;

/// Estimated power draw of resident memory.
pub fn memory_watts(memory_gb: f64) -> f64 {
    if memory_gb <= 0.0 {
        return 0.0;
    }
    memory_gb * MEMORY_WATTS_PER_GB
}

/// Estimated power draw of a block storage allocation, before
/// replication and controller overhead factors.
pub fn block_storage_watts(size_gb: f64, media: StorageMedia) -> f64 {
    if size_gb <= 0.0 {
        return 0.0;
    }
    let per_tb = match media {
        StorageMedia::Hdd => HDD_WATTS_PER_TB,
        StorageMedia::Ssd => SSD_WATTS_PER_TB,
    };
    size_gb / 1024.0 * per_tb
}

/// Estimated power draw of object-store payload bytes. Object stores
/// shard data across many physical disks; the erasure-coding overhead
/// is applied by the bucket calculation on top of this raw figure.
pub fn object_storage_watts(total_bytes: f64) -> f64 {
    if total_bytes <= 0.0 {
        return 0.0;
    }
    let tb = total_bytes / 1024.0 / 1024.0 / 1024.0 / 1024.0;
    tb * HDD_WATTS_PER_TB
}

/// Convert a regional carbon intensity in grams per kWh into grams per
/// joule (grams per watt-second).
pub fn g_per_kwh_to_g_per_ws(intensity_g_kwh: f64) -> f64 {
    intensity_g_kwh / 1000.0 / 60.0 / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_watts_scales_linearly() {
        assert_eq!(memory_watts(0.0), 0.0);
        let one = memory_watts(1.0);
        let eight = memory_watts(8.0);
        assert!((eight - one * 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_block_storage_media_coefficients_differ() {
        let hdd = block_storage_watts(1024.0, StorageMedia::Hdd);
        let ssd = block_storage_watts(1024.0, StorageMedia::Ssd);
        assert!(ssd > hdd);
        assert!((hdd - HDD_WATTS_PER_TB).abs() < 1e-9);
    }

    #[test]
    fn test_object_storage_watts_per_tb() {
        let one_tb_bytes = 1024.0_f64.powi(4);
        let watts = object_storage_watts(one_tb_bytes);
        assert!((watts - HDD_WATTS_PER_TB).abs() < 1e-9);
    }

    #[test]
    fn test_unit_chain_g_per_kwh() {
        // 1000 g/kWh is 1000/3_600_000 grams per watt-second.
        let g_per_ws = g_per_kwh_to_g_per_ws(1000.0);
        assert!((g_per_ws - 1000.0 / 3_600_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_sizes_clamp_to_zero() {
        assert_eq!(memory_watts(-4.0), 0.0);
        assert_eq!(block_storage_watts(-1.0, StorageMedia::Ssd), 0.0);
        assert_eq!(object_storage_watts(-1.0), 0.0);
    }
}
