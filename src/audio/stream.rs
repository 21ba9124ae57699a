use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use symphonia::core::io::MediaSource;

/// Seekable byte stream an asset is decoded from.
///
/// Anything readable and seekable qualifies, so an application can hand the
/// engine data from an archive or other virtual filesystem instead of a path.
pub trait AudioStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> AudioStream for T {}

/// Open a file on disk as an audio stream
pub fn open_file(path: &Path) -> io::Result<Box<dyn AudioStream>> {
    Ok(Box::new(File::open(path)?))
}

/// Cloneable handle to one underlying stream.
///
/// Symphonia takes ownership of its media source, so the decoders hand it a
/// clone and keep another to re-open the container from byte 0.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<Box<dyn AudioStream>>>,
    len: Option<u64>,
}

impl SharedStream {
    pub fn new(mut stream: Box<dyn AudioStream>) -> io::Result<Self> {
        let len = stream_len(&mut stream)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(stream)),
            len,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn AudioStream>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the shared cursor back to the first byte
    pub fn seek_to_start(&self) -> io::Result<()> {
        self.lock().seek(SeekFrom::Start(0)).map(|_| ())
    }

    pub fn len(&self) -> Option<u64> {
        self.len
    }
}

fn stream_len(stream: &mut Box<dyn AudioStream>) -> io::Result<Option<u64>> {
    let current = stream.stream_position()?;
    let end = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(current))?;
    Ok(Some(end))
}

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock().read(buf)
    }
}

impl Seek for SharedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.lock().seek(pos)
    }
}

impl MediaSource for SharedStream {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}
