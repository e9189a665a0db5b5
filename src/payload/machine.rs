use crate::{Error, Result};

/// Machine type to memory, in hundredths of a GB.
///
/// Kept in integer units so derived sizes floor exactly.
const MACHINE_MEMORY_CENTI_GB: &[(&str, u32)] = &[
    ("n1-standard-1", 375),
    ("n1-standard-2", 750),
    ("n1-standard-4", 1_500),
    ("n1-standard-8", 3_000),
    ("n1-standard-16", 6_000),
    ("n1-standard-32", 12_000),
    ("n1-standard-64", 24_000),
    ("n1-highmem-2", 1_300),
    ("n1-highmem-4", 2_600),
    ("n1-highmem-8", 5_200),
    ("n1-highmem-16", 10_400),
    ("n1-highmem-32", 20_800),
    ("n1-highmem-64", 41_600),
    ("n1-highcpu-2", 180),
    ("n1-highcpu-4", 360),
    ("n1-highcpu-8", 720),
    ("n1-highcpu-16", 1_440),
    ("n1-highcpu-32", 2_880),
    ("n1-highcpu-64", 5_760),
];

/// Every machine type with a known memory size.
pub fn known_machine_types() -> impl Iterator<Item = &'static str> {
    MACHINE_MEMORY_CENTI_GB.iter().map(|(name, _)| *name)
}

fn memory_centi_gb(machine_type: &str) -> Result<u32> {
    MACHINE_MEMORY_CENTI_GB
        .iter()
        .find(|(name, _)| *name == machine_type)
        .map(|(_, mem)| *mem)
        .ok_or_else(|| Error::validation(format!("unknown machine type '{machine_type}'")))
}

/// Memory of `machine_type` in GB.
pub fn machine_memory_gb(machine_type: &str) -> Result<f64> {
    Ok(f64::from(memory_centi_gb(machine_type)?) / 100.0)
}

/// Spark driver memory for a master of this type: floor(0.8 x memory) GB.
pub fn driver_memory_gb(machine_type: &str) -> Result<u32> {
    Ok(memory_centi_gb(machine_type)? * 8 / 1_000)
}
