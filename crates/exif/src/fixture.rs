//! Hand-assembled TIFF files for tests, here and in downstream crates.
//!
//! Only the little-endian layout and the four value types the gallery reads
//! are supported.

const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

/// One IFD entry: tag, TIFF type, value count and the encoded value bytes.
#[derive(Clone)]
pub struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

pub fn ascii_entry(tag: u16, text: &str) -> Entry {
    let mut data = text.as_bytes().to_vec();
    data.push(0);
    Entry { tag, kind: ASCII, count: data.len() as u32, data }
}

pub fn rational_entry(tag: u16, values: &[(u32, u32)]) -> Entry {
    let data = values.iter().flat_map(|(n, d)| n.to_le_bytes().into_iter().chain(d.to_le_bytes())).collect();
    Entry { tag, kind: RATIONAL, count: values.len() as u32, data }
}

pub fn short_entry(tag: u16, value: u16) -> Entry {
    Entry { tag, kind: SHORT, count: 1, data: value.to_le_bytes().to_vec() }
}

pub fn long_entry(tag: u16, value: u32) -> Entry {
    Entry { tag, kind: LONG, count: 1, data: value.to_le_bytes().to_vec() }
}

/// Serialize one IFD (plus the out-of-line values it points at) as if it
/// starts at byte `start` of the file.
fn ifd(start: u32, mut entries: Vec<Entry>) -> Vec<u8> {
    entries.sort_by_key(|e| e.tag);
    let mut data_offset = start + 2 + 12 * entries.len() as u32 + 4;
    let mut head = (entries.len() as u16).to_le_bytes().to_vec();
    let mut tail = Vec::new();
    for entry in &entries {
        head.extend(entry.tag.to_le_bytes());
        head.extend(entry.kind.to_le_bytes());
        head.extend(entry.count.to_le_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            head.extend(inline);
        } else {
            head.extend(data_offset.to_le_bytes());
            tail.extend(&entry.data);
            if entry.data.len() % 2 == 1 {
                tail.push(0);
            }
            data_offset = start + 2 + 12 * entries.len() as u32 + 4 + tail.len() as u32;
        }
    }
    head.extend(0u32.to_le_bytes());
    head.extend(tail);
    head
}

/// A little-endian TIFF with `primary` in IFD0 and `exif` in the Exif
/// sub-IFD.
pub fn tiff(primary: Vec<Entry>, exif: Vec<Entry>) -> Vec<u8> {
    const EXIF_POINTER: u16 = 0x8769;
    let sizing = {
        let mut entries = primary.clone();
        entries.push(long_entry(EXIF_POINTER, 0));
        ifd(8, entries).len() as u32
    };
    let exif_start = 8 + sizing;
    let mut entries = primary;
    entries.push(long_entry(EXIF_POINTER, exif_start));
    let mut file = b"II".to_vec();
    file.extend(42u16.to_le_bytes());
    file.extend(8u32.to_le_bytes());
    file.extend(ifd(8, entries));
    file.extend(ifd(exif_start, exif));
    file
}

/// IFD0 entries of a Sony ILCE-7M3.
pub fn camera() -> Vec<Entry> {
    vec![ascii_entry(0x010F, "SONY"), ascii_entry(0x0110, "ILCE-7M3")]
}

/// Exif sub-IFD entries: 1/250s at f/2.8, ISO 400, 50mm. No lens tags.
pub fn settings() -> Vec<Entry> {
    vec![
        rational_entry(0x829A, &[(1, 250)]),
        rational_entry(0x829D, &[(28, 10)]),
        short_entry(0x8827, 400),
        rational_entry(0x920A, &[(50, 1)]),
    ]
}

/// A complete image: [`camera`], [`settings`] and the lens model
/// `FE 50mm F1.8`.
pub fn sample() -> Vec<u8> {
    let mut exif = settings();
    exif.push(ascii_entry(0xA434, "FE 50mm F1.8"));
    tiff(camera(), exif)
}
