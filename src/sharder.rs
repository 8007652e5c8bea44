/// Maps a bucketing key onto one of `total_shards` buckets.
pub(crate) trait Sharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64;
}

pub(crate) struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let int_from_hash = u64::from(u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]));
        int_from_hash % total_shards
    }
}

#[cfg(test)]
pub(crate) struct DeterministicSharder(pub std::collections::HashMap<String, u64>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        self.0.get(input).copied().unwrap_or(0) % total_shards
    }
}
