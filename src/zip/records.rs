//! ZIP wire records for streaming (data-descriptor) mode.
//!
//! All records are emitted in ZIP64 form: local headers defer sizes to an
//! 8-byte data descriptor, central directory entries carry a ZIP64 extra
//! field, and the archive ends with the ZIP64 end-of-central-directory
//! record, its locator and the classic end record. This keeps volumes near
//! the 4 GiB cap representable without per-entry format decisions.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_FILE_HEADER_SIG: u32 = 0x0201_4b50;
const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x0606_4b50;
const ZIP64_END_LOCATOR_SIG: u32 = 0x0706_4b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;

/// Version 4.5: the first with ZIP64 support.
const VERSION_ZIP64: u16 = 45;

/// General purpose flags: bit 3 (sizes in data descriptor) + bit 11
/// (UTF-8 file names).
const FLAGS_STREAMING_UTF8: u16 = 0x0008 | 0x0800;

/// Store, no compression.
const METHOD_STORE: u16 = 0;

const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Bookkeeping for one finished entry, needed again when the central
/// directory is written.
#[derive(Debug, Clone)]
pub(crate) struct EntryRecord {
    /// In-archive path (forward slashes, UTF-8).
    pub name: String,
    /// CRC-32 of the stored bytes.
    pub crc: u32,
    /// Stored (= uncompressed) size in bytes.
    pub size: u64,
    /// Offset of the entry's local header from the start of the archive.
    pub offset: u64,
    /// DOS-format modification time and date.
    pub dos: (u16, u16),
}

/// Encodes the local file header for one entry.
///
/// Sizes and CRC are zero here; the real values follow the entry's bytes in
/// the data descriptor.
pub(crate) fn local_file_header(name: &str, dos: (u16, u16)) -> Bytes {
    let name_bytes = name.as_bytes();
    let mut buf = BytesMut::with_capacity(30 + name_bytes.len());
    buf.put_u32_le(LOCAL_FILE_HEADER_SIG);
    buf.put_u16_le(VERSION_ZIP64);
    buf.put_u16_le(FLAGS_STREAMING_UTF8);
    buf.put_u16_le(METHOD_STORE);
    buf.put_u16_le(dos.0);
    buf.put_u16_le(dos.1);
    buf.put_u32_le(0); // crc-32, deferred
    buf.put_u32_le(0); // compressed size, deferred
    buf.put_u32_le(0); // uncompressed size, deferred
    buf.put_u16_le(name_bytes.len() as u16);
    buf.put_u16_le(0); // extra field length
    buf.put_slice(name_bytes);
    buf.freeze()
}

/// Encodes the ZIP64 data descriptor trailing one entry's bytes.
pub(crate) fn data_descriptor(crc: u32, size: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_u32_le(DATA_DESCRIPTOR_SIG);
    buf.put_u32_le(crc);
    buf.put_u64_le(size); // compressed == uncompressed for store
    buf.put_u64_le(size);
    buf.freeze()
}

/// Encodes the central directory and all end records for the archive.
///
/// `cd_offset` is the byte offset at which the central directory begins,
/// i.e. the total length of everything emitted so far.
pub(crate) fn central_directory(records: &[EntryRecord], cd_offset: u64) -> Bytes {
    let mut buf = BytesMut::new();

    for record in records {
        central_file_header(&mut buf, record);
    }
    let cd_size = buf.len() as u64;

    // ZIP64 end of central directory record
    let zip64_eocd_offset = cd_offset + cd_size;
    buf.put_u32_le(ZIP64_END_OF_CENTRAL_DIR_SIG);
    buf.put_u64_le(44); // size of the remainder of this record
    buf.put_u16_le(VERSION_ZIP64);
    buf.put_u16_le(VERSION_ZIP64);
    buf.put_u32_le(0); // this disk
    buf.put_u32_le(0); // disk with the central directory
    buf.put_u64_le(records.len() as u64);
    buf.put_u64_le(records.len() as u64);
    buf.put_u64_le(cd_size);
    buf.put_u64_le(cd_offset);

    // ZIP64 end of central directory locator
    buf.put_u32_le(ZIP64_END_LOCATOR_SIG);
    buf.put_u32_le(0);
    buf.put_u64_le(zip64_eocd_offset);
    buf.put_u32_le(1); // total disks

    // Classic end of central directory, clamped where values overflow
    buf.put_u32_le(END_OF_CENTRAL_DIR_SIG);
    buf.put_u16_le(0);
    buf.put_u16_le(0);
    buf.put_u16_le(clamp_u16(records.len() as u64));
    buf.put_u16_le(clamp_u16(records.len() as u64));
    buf.put_u32_le(clamp_u32(cd_size));
    buf.put_u32_le(clamp_u32(cd_offset));
    buf.put_u16_le(0); // comment length

    buf.freeze()
}

fn central_file_header(buf: &mut BytesMut, record: &EntryRecord) {
    let name_bytes = record.name.as_bytes();
    // ZIP64 extra: uncompressed size, compressed size, local header offset
    let extra_len: u16 = 4 + 8 + 8 + 8;

    buf.put_u32_le(CENTRAL_FILE_HEADER_SIG);
    buf.put_u16_le(VERSION_ZIP64); // version made by
    buf.put_u16_le(VERSION_ZIP64); // version needed
    buf.put_u16_le(FLAGS_STREAMING_UTF8);
    buf.put_u16_le(METHOD_STORE);
    buf.put_u16_le(record.dos.0);
    buf.put_u16_le(record.dos.1);
    buf.put_u32_le(record.crc);
    buf.put_u32_le(u32::MAX); // sizes live in the ZIP64 extra
    buf.put_u32_le(u32::MAX);
    buf.put_u16_le(name_bytes.len() as u16);
    buf.put_u16_le(extra_len);
    buf.put_u16_le(0); // comment length
    buf.put_u16_le(0); // disk number start
    buf.put_u16_le(0); // internal attributes
    buf.put_u32_le(0); // external attributes
    buf.put_u32_le(u32::MAX); // offset lives in the ZIP64 extra
    buf.put_slice(name_bytes);

    buf.put_u16_le(ZIP64_EXTRA_ID);
    buf.put_u16_le(extra_len - 4);
    buf.put_u64_le(record.size);
    buf.put_u64_le(record.size);
    buf.put_u64_le(record.offset);
}

fn clamp_u16(v: u64) -> u16 {
    v.min(u16::MAX as u64) as u16
}

fn clamp_u32(v: u64) -> u32 {
    v.min(u32::MAX as u64) as u32
}

/// Converts a system time to DOS (date, time) words, clamped to the format's
/// 1980..=2107 range with 2-second resolution.
pub(crate) fn dos_datetime(t: SystemTime) -> (u16, u16) {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let days = (secs / 86_400) as i64;
    let (year, month, day) = civil_from_days(days);
    let year = year.clamp(1980, 2107);

    let tod = secs % 86_400;
    let (hour, minute, second) = (tod / 3600, (tod % 3600) / 60, tod % 60);

    let time = ((hour as u16) << 11) | ((minute as u16) << 5) | ((second / 2) as u16);
    let date = (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16;
    (time, date)
}

/// Days-since-epoch to civil date (proleptic Gregorian).
fn civil_from_days(z: i64) -> (i64, u8, u8) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    (if m <= 2 { y + 1 } else { y }, m, d)
}
