//! Kernel-wide tunables.

/// Open files per thread, including the two console descriptors.
pub const NOFILE: usize = 16;

/// Well-known descriptors, always bound to the console.
pub const CONSOLE_INPUT: i32 = 0;
pub const CONSOLE_OUTPUT: i32 = 1;

/// A page of simulated memory holds exactly one disk sector.
pub const PAGE_SIZE: usize = fs_lib::SECTOR_SIZE;
/// Physical pages of the simulated machine.
pub const NUM_PHYS_PAGES: usize = 32;
pub const MEMORY_SIZE: usize = NUM_PHYS_PAGES * PAGE_SIZE;
/// Translation lookaside buffer entries.
pub const TLB_SIZE: usize = 4;
/// Pages reserved for a user program's stack.
pub const STACK_PAGES: usize = 8;

/// Default thread priority. The ready set keeps three bands: below this
/// value, exactly this value, and above it.
pub const DEFAULT_PRIORITY: usize = 20;

/// Bound on EXEC argument marshalling.
pub const MAX_ARG_COUNT: usize = 32;
pub const MAX_ARG_LEN: usize = 128;
