/// Counters kept by a bridge
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub queries: u64,
    pub commands: u64,
    pub callbacks: u64,
    pub callback_failures: u64,
    pub faults: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Bridge statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub queries: u64,
    pub commands: u64,
    pub callbacks: u64,
    pub callback_failures: u64,
    pub faults: u64,
    /// Bytes decoded into the engine, query arguments and callback replies
    pub bytes_in: u64,
    /// Bytes encoded out of the engine, callback requests and query replies
    pub bytes_out: u64,
    pub leases_outstanding: usize,
}

impl Counters {
    pub fn snapshot(&self, leases_outstanding: usize) -> BridgeStats {
        BridgeStats {
            queries: self.queries,
            commands: self.commands,
            callbacks: self.callbacks,
            callback_failures: self.callback_failures,
            faults: self.faults,
            bytes_in: self.bytes_in,
            bytes_out: self.bytes_out,
            leases_outstanding,
        }
    }
}
