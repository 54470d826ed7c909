//! Resource ID allocation: `<prefix>-<17 lowercase hex chars>`.

use rand::RngCore;

pub const INSTANCE_PREFIX: &str = "i";
pub const VOLUME_PREFIX: &str = "vol";
pub const NETWORK_INTERFACE_PREFIX: &str = "eni";
pub const LAUNCH_TEMPLATE_PREFIX: &str = "lt";
pub const SPOT_REQUEST_PREFIX: &str = "sir";

const RANDOM_HEX_LEN: usize = 17;

/// Injectable randomness source so tests can assert on generated IDs.
pub trait RngSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

/// Production randomness, backed by the thread-local CSPRNG.
#[derive(Clone, Copy, Default)]
pub struct OsRng;

impl RngSource for OsRng {
    fn fill(&self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }
}

/// Deterministic randomness source for tests: a simple counter expanded
/// into bytes, so generated IDs are reproducible across a test run.
pub struct SequentialRng {
    next: std::sync::atomic::AtomicU64,
}

impl SequentialRng {
    pub fn new(seed: u64) -> Self {
        Self {
            next: std::sync::atomic::AtomicU64::new(seed),
        }
    }
}

impl RngSource for SequentialRng {
    fn fill(&self, buf: &mut [u8]) {
        let mut n = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        for b in buf.iter_mut() {
            *b = (n & 0xff) as u8;
            n = n.rotate_left(8).wrapping_add(0x9e37_79b9);
        }
    }
}

pub struct IdAllocator<R: RngSource = OsRng> {
    rng: R,
}

impl Default for IdAllocator<OsRng> {
    fn default() -> Self {
        Self { rng: OsRng }
    }
}

impl<R: RngSource> IdAllocator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Allocates `<prefix>-<17 lowercase hex chars>`.
    pub fn allocate(&self, prefix: &str) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        // 17 hex nibbles need 9 random bytes (18 nibbles), drop the last one.
        let mut buf = [0u8; 9];
        self.rng.fill(&mut buf);
        let mut hex = String::with_capacity(RANDOM_HEX_LEN);
        'outer: for byte in buf {
            for nibble in [byte >> 4, byte & 0x0f] {
                if hex.len() == RANDOM_HEX_LEN {
                    break 'outer;
                }
                hex.push(HEX[nibble as usize] as char);
            }
        }
        format!("{prefix}-{hex}")
    }

    pub fn allocate_instance(&self) -> String {
        self.allocate(INSTANCE_PREFIX)
    }

    pub fn allocate_volume(&self) -> String {
        self.allocate(VOLUME_PREFIX)
    }

    pub fn allocate_network_interface(&self) -> String {
        self.allocate(NETWORK_INTERFACE_PREFIX)
    }

    pub fn allocate_launch_template(&self) -> String {
        self.allocate(LAUNCH_TEMPLATE_PREFIX)
    }

    pub fn allocate_spot_request(&self) -> String {
        self.allocate(SPOT_REQUEST_PREFIX)
    }
}

/// The runtime ID is the container-identifying suffix of an instance ID
/// (the instance ID minus its `i-` prefix), used as both the container
/// name and the `dc2:instance-id` container label value.
pub fn runtime_id(instance_id: &str) -> &str {
    instance_id.strip_prefix("i-").unwrap_or(instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_with_prefix_and_length() {
        let alloc = IdAllocator::new(SequentialRng::new(1));
        let id = alloc.allocate_instance();
        assert!(id.starts_with("i-"));
        assert_eq!(id.len(), "i-".len() + 17);
        assert!(id[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sequential_rng_is_deterministic() {
        let a = IdAllocator::new(SequentialRng::new(42));
        let b = IdAllocator::new(SequentialRng::new(42));
        assert_eq!(a.allocate_instance(), b.allocate_instance());
    }

    #[test]
    fn runtime_id_strips_prefix() {
        assert_eq!(runtime_id("i-0123456789abcdef0"), "0123456789abcdef0");
        assert_eq!(runtime_id("vol-0123456789abcdef0"), "vol-0123456789abcdef0");
    }
}
