use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

const LEN_BYTES: usize = 4;
const CRC_BYTES: usize = 4;

/// Append-only log of room, guest and reservation saves.
///
/// Each record is `[u32 len][bincode Event][u32 crc32]`, little-endian, where
/// `len` counts only the payload. Records are full entity states, so the log
/// can be rewritten at any time as one record per live entity.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open for appending, discarding a damaged tail left by a crash.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(wal, _)| wal)
    }

    /// Read every intact record, cut the file back to the last one, and
    /// open it for appending. New records never land behind a torn one.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let scan = Scan::read(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if scan.intact_len < scan.file_len {
            file.set_len(scan.intact_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        };
        Ok((wal, scan.events))
    }

    /// Intact records on disk, oldest first. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Scan::read(path).map(|scan| scan.events)
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Queue a record; durable only after the next `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.writer.write_all(&frame(event)?)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Replace the log with `events`. The snapshot is written and fsynced
    /// beside the log, then renamed over it.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        self.writer.flush()?;
        let staging = self.path.with_extension("wal.tmp");
        {
            let mut out = BufWriter::new(File::create(&staging)?);
            for event in events {
                out.write_all(&frame(event)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

fn frame(event: &Event) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "WAL record too large"))?;
    let mut buf = Vec::with_capacity(LEN_BYTES + payload.len() + CRC_BYTES);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(buf)
}

#[derive(Default)]
struct Scan {
    events: Vec<Event>,
    /// Bytes up to the end of the last intact record.
    intact_len: u64,
    file_len: u64,
}

enum Record {
    Intact { event: Event, size: u64 },
    End,
    Damaged(&'static str),
}

impl Scan {
    fn read(path: &Path) -> io::Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        let mut scan = Self {
            file_len: file.metadata()?.len(),
            ..Self::default()
        };
        let mut reader = BufReader::new(file);
        loop {
            match next_record(&mut reader, scan.file_len - scan.intact_len)? {
                Record::Intact { event, size } => {
                    scan.events.push(event);
                    scan.intact_len += size;
                }
                Record::End => break,
                Record::Damaged(why) => {
                    warn!(
                        path = %path.display(),
                        offset = scan.intact_len,
                        dropped_bytes = scan.file_len - scan.intact_len,
                        why,
                        "discarding damaged WAL tail"
                    );
                    break;
                }
            }
        }
        Ok(scan)
    }
}

fn next_record(reader: &mut impl Read, remaining: u64) -> io::Result<Record> {
    let mut len = [0u8; LEN_BYTES];
    match fill(reader, &mut len)? {
        0 => return Ok(Record::End),
        n if n < LEN_BYTES => return Ok(Record::Damaged("torn length prefix")),
        _ => {}
    }
    let len = u32::from_le_bytes(len) as usize;
    let size = (LEN_BYTES + len + CRC_BYTES) as u64;
    if size > remaining {
        return Ok(Record::Damaged("record runs past end of file"));
    }

    let mut body = vec![0u8; len + CRC_BYTES];
    if fill(reader, &mut body)? < body.len() {
        return Ok(Record::Damaged("torn record"));
    }
    let (payload, crc) = body.split_at(len);
    if crc != crc32fast::hash(payload).to_le_bytes() {
        return Ok(Record::Damaged("checksum mismatch"));
    }
    Ok(match bincode::deserialize(payload) {
        Ok(event) => Record::Intact { event, size },
        Err(_) => Record::Damaged("undecodable payload"),
    })
}

/// `read_exact` that reports a short read instead of failing on it.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
