use std::fs::File;
use std::io::{self, Write};

/// Append-only destination for log records.
///
/// `flush` pushes buffered bytes to the operating system; `sync` makes them
/// durable. Implementations may block.
pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl WritableFile for File {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(self)
    }

    fn sync(&mut self) -> io::Result<()> {
        Write::flush(self)?;
        self.sync_all()
    }
}

/// In-memory log, mostly for tests and for staging.
impl WritableFile for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: WritableFile + ?Sized> WritableFile for &mut W {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).append(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}
