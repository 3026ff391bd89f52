/// Segment codec: a tag-length-value container for shard envelopes.
///
/// On-disk / on-wire layout (spec.md §6, bit-exact):
///
/// ```text
/// [xref_length: u32 BE]
/// [xref_entry × N]      tag_ascii_nul_terminated, offset: u64 LE, length: u64 LE
/// [field bytes × N]     concatenated in the same order as the xref entries
/// ```
///
/// Reading supports random access by tag once the xref table has been parsed
/// from the head of a buffer, so a caller can pull out just `SEGMENTID` and
/// `CRC32CHECKSUM` without touching the (potentially large) `SEGMENTCONTENT`
/// field.
use std::collections::HashMap;

use crate::error::{DfsError, DfsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    FileId,
    Name,
    Extension,
    Size,
    ContentType,
    Sha256Hash,
    UploadTime,
    P2pkhScript,
    P2pkScript,
    SliceTable,
    SegmentId,
    SegmentIndex,
    Crc32Checksum,
    SegmentContent,
    EncryptionKey,
    Signature,
    Shared,
    Version,
}

impl Tag {
    fn as_str(&self) -> &'static str {
        match self {
            Tag::FileId => "FILEID",
            Tag::Name => "NAME",
            Tag::Extension => "EXTENSION",
            Tag::Size => "SIZE",
            Tag::ContentType => "CONTENTTYPE",
            Tag::Sha256Hash => "SHA256HASH",
            Tag::UploadTime => "UPLOADTIME",
            Tag::P2pkhScript => "P2PKHSCRIPT",
            Tag::P2pkScript => "P2PKSCRIPT",
            Tag::SliceTable => "SLICETABLE",
            Tag::SegmentId => "SEGMENTID",
            Tag::SegmentIndex => "SEGMENTINDEX",
            Tag::Crc32Checksum => "CRC32CHECKSUM",
            Tag::SegmentContent => "SEGMENTCONTENT",
            Tag::EncryptionKey => "ENCRYPTIONKEY",
            Tag::Signature => "SIGNATURE",
            Tag::Shared => "SHARED",
            Tag::Version => "VERSION",
        }
    }

    fn from_str(s: &str) -> Option<Tag> {
        Some(match s {
            "FILEID" => Tag::FileId,
            "NAME" => Tag::Name,
            "EXTENSION" => Tag::Extension,
            "SIZE" => Tag::Size,
            "CONTENTTYPE" => Tag::ContentType,
            "SHA256HASH" => Tag::Sha256Hash,
            "UPLOADTIME" => Tag::UploadTime,
            "P2PKHSCRIPT" => Tag::P2pkhScript,
            "P2PKSCRIPT" => Tag::P2pkScript,
            "SLICETABLE" => Tag::SliceTable,
            "SEGMENTID" => Tag::SegmentId,
            "SEGMENTINDEX" => Tag::SegmentIndex,
            "CRC32CHECKSUM" => Tag::Crc32Checksum,
            "SEGMENTCONTENT" => Tag::SegmentContent,
            "ENCRYPTIONKEY" => Tag::EncryptionKey,
            "SIGNATURE" => Tag::Signature,
            "SHARED" => Tag::Shared,
            "VERSION" => Tag::Version,
            _ => return None,
        })
    }
}

/// Builds a segment container from a set of tagged fields.
#[derive(Default)]
pub struct SegmentWriter {
    fields: Vec<(Tag, Vec<u8>)>,
}

impl SegmentWriter {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn put(&mut self, tag: Tag, bytes: Vec<u8>) -> &mut Self {
        self.fields.push((tag, bytes));
        self
    }

    pub fn put_string(&mut self, tag: Tag, value: &str) -> &mut Self {
        self.put(tag, encode_string(value))
    }

    pub fn put_i64(&mut self, tag: Tag, value: i64) -> &mut Self {
        self.put(tag, encode_i64(value))
    }

    pub fn put_u32(&mut self, tag: Tag, value: u32) -> &mut Self {
        self.put(tag, encode_u32(value))
    }

    pub fn put_bool(&mut self, tag: Tag, value: bool) -> &mut Self {
        self.put(tag, encode_bool(value))
    }

    pub fn put_bytes(&mut self, tag: Tag, value: &[u8]) -> &mut Self {
        self.put(tag, encode_bytes(value))
    }

    /// Serialize to the final xref-table + field-bytes container.
    pub fn finish(&self) -> Vec<u8> {
        let mut xref = Vec::new();
        let mut payload = Vec::new();
        let mut offset: u64 = 0;

        for (tag, bytes) in &self.fields {
            xref.extend_from_slice(tag.as_str().as_bytes());
            xref.push(0);
            xref.extend_from_slice(&offset.to_le_bytes());
            xref.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            payload.extend_from_slice(bytes);
            offset += bytes.len() as u64;
        }

        let mut out = Vec::with_capacity(4 + xref.len() + payload.len());
        out.extend_from_slice(&(xref.len() as u32).to_be_bytes());
        out.extend_from_slice(&xref);
        out.extend_from_slice(&payload);
        out
    }
}

struct XrefEntry {
    offset: u64,
    length: u64,
}

/// Parses the xref table from the head of a buffer and offers random access
/// to fields by tag.
pub struct SegmentReader<'a> {
    buf: &'a [u8],
    payload_start: usize,
    xref: HashMap<Tag, XrefEntry>,
}

impl<'a> SegmentReader<'a> {
    pub fn parse(buf: &'a [u8]) -> DfsResult<Self> {
        if buf.len() < 4 {
            return Err(DfsError::Corruption("segment too short for xref length".into()));
        }
        let xref_len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let xref_bytes = buf
            .get(4..4 + xref_len)
            .ok_or_else(|| DfsError::Corruption("xref table runs past end of buffer".into()))?;

        let mut xref = HashMap::new();
        let mut i = 0;
        while i < xref_bytes.len() {
            let nul = xref_bytes[i..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| DfsError::Corruption("unterminated tag in xref entry".into()))?;
            let tag_str = std::str::from_utf8(&xref_bytes[i..i + nul])
                .map_err(|_| DfsError::Corruption("non-utf8 tag".into()))?;
            let tag = Tag::from_str(tag_str)
                .ok_or_else(|| DfsError::Corruption(format!("unknown tag {}", tag_str)))?;
            i += nul + 1;
            if i + 16 > xref_bytes.len() {
                return Err(DfsError::Corruption("truncated xref entry".into()));
            }
            let offset = u64::from_le_bytes(xref_bytes[i..i + 8].try_into().unwrap());
            let length = u64::from_le_bytes(xref_bytes[i + 8..i + 16].try_into().unwrap());
            i += 16;

            if xref.insert(tag, XrefEntry { offset, length }).is_some() {
                return Err(DfsError::Corruption(format!("duplicate tag {:?}", tag)));
            }
        }

        let payload_start = 4 + xref_len;
        let payload_len = (buf.len() - payload_start) as u64;
        for entry in xref.values() {
            let end = entry
                .offset
                .checked_add(entry.length)
                .ok_or_else(|| DfsError::Corruption("xref offset overflow".into()))?;
            if end > payload_len {
                return Err(DfsError::Corruption("xref entry runs past end of payload".into()));
            }
        }

        Ok(Self {
            buf,
            payload_start,
            xref,
        })
    }

    pub fn field(&self, tag: Tag) -> Option<&'a [u8]> {
        let entry = self.xref.get(&tag)?;
        let start = self.payload_start + entry.offset as usize;
        let end = start + entry.length as usize;
        self.buf.get(start..end)
    }

    pub fn require(&self, tag: Tag) -> DfsResult<&'a [u8]> {
        self.field(tag)
            .ok_or_else(|| DfsError::Corruption(format!("missing tag {:?}", tag)))
    }

    pub fn fields(&self, tags: &[Tag]) -> HashMap<Tag, DfsResult<Vec<u8>>> {
        tags.iter()
            .map(|&tag| {
                let result = self
                    .field(tag)
                    .map(|b| b.to_vec())
                    .ok_or_else(|| DfsError::Corruption(format!("missing tag {:?}", tag)));
                (tag, result)
            })
            .collect()
    }

    pub fn string(&self, tag: Tag) -> DfsResult<String> {
        decode_string(self.require(tag)?)
    }

    pub fn i64(&self, tag: Tag) -> DfsResult<i64> {
        decode_i64(self.require(tag)?)
    }

    pub fn u32(&self, tag: Tag) -> DfsResult<u32> {
        decode_u32(self.require(tag)?)
    }

    pub fn bool(&self, tag: Tag) -> DfsResult<bool> {
        decode_bool(self.require(tag)?)
    }

    pub fn bytes(&self, tag: Tag) -> DfsResult<Vec<u8>> {
        decode_bytes(self.require(tag)?)
    }
}

pub fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
    out
}

pub fn decode_string(buf: &[u8]) -> DfsResult<String> {
    let (len, rest) = decode_len_prefix(buf)?;
    String::from_utf8(rest[..len].to_vec())
        .map_err(|_| DfsError::Corruption("string field is not valid UTF-8".into()))
}

pub fn encode_i64(value: i64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_i64(buf: &[u8]) -> DfsResult<i64> {
    let arr: [u8; 8] = buf
        .try_into()
        .map_err(|_| DfsError::Corruption("i64 field has wrong width".into()))?;
    Ok(i64::from_le_bytes(arr))
}

pub fn encode_u32(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_u32(buf: &[u8]) -> DfsResult<u32> {
    let arr: [u8; 4] = buf
        .try_into()
        .map_err(|_| DfsError::Corruption("u32 field has wrong width".into()))?;
    Ok(u32::from_le_bytes(arr))
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    vec![if value { 1 } else { 0 }]
}

pub fn decode_bool(buf: &[u8]) -> DfsResult<bool> {
    match buf {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(DfsError::Corruption("bool field has wrong width".into())),
    }
}

pub fn encode_bytes(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + value.len());
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
    out
}

pub fn decode_bytes(buf: &[u8]) -> DfsResult<Vec<u8>> {
    let (len, rest) = decode_len_prefix(buf)?;
    Ok(rest[..len].to_vec())
}

fn decode_len_prefix(buf: &[u8]) -> DfsResult<(usize, &[u8])> {
    if buf.len() < 4 {
        return Err(DfsError::Corruption("length-prefixed field too short".into()));
    }
    let len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let rest = &buf[4..];
    if rest.len() < len {
        return Err(DfsError::Corruption("length-prefixed field truncated".into()));
    }
    Ok((len, rest))
}

/// One entry of the `HashTable` manifest, spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTableEntry {
    pub index: i64,
    pub segment_id: String,
    pub crc32: u32,
    pub is_parity: bool,
}

/// `SLICETABLE` is the concatenation of sorted `(index, segment_id, crc32,
/// is_parity)` entries prefixed by a `u32 LE` count, spec.md §6.
pub fn encode_hash_table(entries: &[HashTableEntry]) -> Vec<u8> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.index);

    let mut out = Vec::new();
    out.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
    for entry in &sorted {
        out.extend_from_slice(&entry.index.to_le_bytes());
        out.extend_from_slice(&encode_string(&entry.segment_id));
        out.extend_from_slice(&entry.crc32.to_le_bytes());
        out.extend_from_slice(&encode_bool(entry.is_parity));
    }
    out
}

pub fn decode_hash_table(buf: &[u8]) -> DfsResult<Vec<HashTableEntry>> {
    if buf.len() < 4 {
        return Err(DfsError::Corruption("slice table too short".into()));
    }
    let count = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let mut cursor = &buf[4..];
    let mut entries = Vec::with_capacity(count);

    for _ in 0..count {
        let index = decode_i64(cursor.get(0..8).ok_or_else(too_short)?)?;
        cursor = &cursor[8..];
        let (name_len, rest) = decode_len_prefix(cursor)?;
        let segment_id = decode_string(cursor)?;
        cursor = &rest[name_len..];
        let crc32 = decode_u32(cursor.get(0..4).ok_or_else(too_short)?)?;
        cursor = &cursor[4..];
        let is_parity = decode_bool(cursor.get(0..1).ok_or_else(too_short)?)?;
        cursor = &cursor[1..];
        entries.push(HashTableEntry {
            index,
            segment_id,
            crc32,
            is_parity,
        });
    }

    Ok(entries)
}

fn too_short() -> DfsError {
    DfsError::Corruption("slice table entry truncated".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_fields() {
        let mut writer = SegmentWriter::new();
        writer
            .put_string(Tag::FileId, "file-123")
            .put_i64(Tag::Size, 4096)
            .put_u32(Tag::Crc32Checksum, 0xdeadbeef)
            .put_bool(Tag::Shared, true)
            .put_bytes(Tag::SegmentContent, b"hello world");

        let bytes = writer.finish();
        let reader = SegmentReader::parse(&bytes).unwrap();

        assert_eq!(reader.string(Tag::FileId).unwrap(), "file-123");
        assert_eq!(reader.i64(Tag::Size).unwrap(), 4096);
        assert_eq!(reader.u32(Tag::Crc32Checksum).unwrap(), 0xdeadbeef);
        assert!(reader.bool(Tag::Shared).unwrap());
        assert_eq!(reader.bytes(Tag::SegmentContent).unwrap(), b"hello world");
    }

    #[test]
    fn hash_table_round_trips_and_sorts_by_index() {
        let entries = vec![
            HashTableEntry { index: 2, segment_id: "b".into(), crc32: 2, is_parity: true },
            HashTableEntry { index: 0, segment_id: "a".into(), crc32: 1, is_parity: false },
        ];
        let encoded = encode_hash_table(&entries);
        let decoded = decode_hash_table(&encoded).unwrap();
        assert_eq!(decoded[0].index, 0);
        assert_eq!(decoded[1].index, 2);
    }

    #[test]
    fn rejects_duplicate_tags() {
        let mut xref = Vec::new();
        xref.extend_from_slice(b"SIZE\0");
        xref.extend_from_slice(&0u64.to_le_bytes());
        xref.extend_from_slice(&8u64.to_le_bytes());
        xref.extend_from_slice(b"SIZE\0");
        xref.extend_from_slice(&0u64.to_le_bytes());
        xref.extend_from_slice(&8u64.to_le_bytes());

        let mut buf = Vec::new();
        buf.extend_from_slice(&(xref.len() as u32).to_be_bytes());
        buf.extend_from_slice(&xref);
        buf.extend_from_slice(&0i64.to_le_bytes());

        assert!(SegmentReader::parse(&buf).is_err());
    }

    #[test]
    fn rejects_offsets_past_end_of_buffer() {
        let mut xref = Vec::new();
        xref.extend_from_slice(b"SIZE\0");
        xref.extend_from_slice(&1000u64.to_le_bytes());
        xref.extend_from_slice(&8u64.to_le_bytes());

        let mut buf = Vec::new();
        buf.extend_from_slice(&(xref.len() as u32).to_be_bytes());
        buf.extend_from_slice(&xref);
        buf.extend_from_slice(&0i64.to_le_bytes());

        assert!(SegmentReader::parse(&buf).is_err());
    }
}
