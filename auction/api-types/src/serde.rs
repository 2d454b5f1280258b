pub mod timestamp_ms {
    use {
        serde::{
            de::Error,
            Deserialize,
            Deserializer,
            Serializer,
        },
        time::OffsetDateTime,
    };

    // Wire timestamps are integer Unix milliseconds, matching what the
    // javascript clients produce and expect from `Date.now()`.
    pub fn serialize<S>(t: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_i64((t.unix_timestamp_nanos() / 1_000_000) as i64)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(d)?;
        OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
            .map_err(|err| D::Error::custom(err.to_string()))
    }
}
