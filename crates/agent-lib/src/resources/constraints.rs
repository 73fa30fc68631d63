//! CPU/memory bounds for Cloud Run containers
//!
//! Hard bounds reject a pair outright. The coupling tables then nudge a
//! valid pair toward a combination the platform accepts: some CPU tiers
//! need a minimum amount of memory and large memory sizes need a minimum
//! number of cores.

use crate::error::ConstraintViolation;

pub const MIN_CPU: u32 = 1;
pub const MAX_CPU: u32 = 8;
pub const MIN_MEMORY_MIB: u32 = 512;
pub const MAX_MEMORY_MIB: u32 = 24576;

/// Minimum memory (MiB) for specific CPU tiers
pub const CPU_TO_MIN_MEMORY: &[(u32, u32)] = &[(4, 2048), (6, 4096), (8, 4096)];

/// Minimum cores for specific memory sizes (MiB)
pub const MEMORY_TO_MIN_CPU: &[(u32, u32)] = &[(4096, 2), (8192, 4), (16384, 6), (24576, 8)];

/// Validates and corrects CPU/memory pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintValidator;

impl ConstraintValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check the hard bounds; CPU is checked before memory
    pub fn check(&self, cpu: u32, memory_mib: u32) -> Result<(), ConstraintViolation> {
        if cpu < MIN_CPU {
            return Err(ConstraintViolation::CpuTooSmall { cpu, min: MIN_CPU });
        }
        if cpu > MAX_CPU {
            return Err(ConstraintViolation::CpuTooLarge { cpu, max: MAX_CPU });
        }
        if memory_mib < MIN_MEMORY_MIB {
            return Err(ConstraintViolation::MemoryTooSmall {
                memory_mib,
                min: MIN_MEMORY_MIB,
            });
        }
        if memory_mib > MAX_MEMORY_MIB {
            return Err(ConstraintViolation::MemoryTooLarge {
                memory_mib,
                max: MAX_MEMORY_MIB,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self, cpu: u32, memory_mib: u32) -> bool {
        self.check(cpu, memory_mib).is_ok()
    }

    /// Apply at most one coupling correction; the CPU-driven rule wins
    pub fn auto_correct(&self, cpu: u32, memory_mib: u32) -> (u32, u32) {
        if let Some(min_memory) = lookup(CPU_TO_MIN_MEMORY, cpu) {
            if memory_mib < min_memory {
                return (cpu, min_memory);
            }
        }
        if let Some(min_cpu) = lookup(MEMORY_TO_MIN_CPU, memory_mib) {
            if cpu < min_cpu {
                return (min_cpu, memory_mib);
            }
        }
        (cpu, memory_mib)
    }
}

fn lookup(table: &[(u32, u32)], key: u32) -> Option<u32> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}
