pub trait Serialize<'a> {
    /// Writes the structured part of the message into `buf`.
    ///
    /// Optionally returns a borrowed bulk tail that must be appended
    /// verbatim after the structured part, avoiding a copy of large
    /// payloads into the serialization buffer.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
