/// Keys owned by the tracker itself. Caller writes to them are dropped with
/// a warning.
pub const READ_ONLY_PARAMS: &[&str] = &[
    "vtag", "ptag", "lng", "mfmd", "os", "apid", "apvr", "hl", "r", "car", "cn", "ts", "olt",
    "mh", "dls", "idclient",
];

pub fn is_read_only(key: &str) -> bool {
    READ_ONLY_PARAMS.contains(&key)
}
