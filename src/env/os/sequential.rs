use crate::env::traits::SequentialFile;
use crate::error::{EnvError, EnvResult};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// 基于带缓冲读流的顺序文件
pub struct PosixSequentialFile {
    path: PathBuf,
    reader: BufReader<File>,
}

impl PosixSequentialFile {
    pub(crate) fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            reader: BufReader::new(file),
        }
    }
}

impl SequentialFile for PosixSequentialFile {
    fn read(&mut self, buf: &mut [u8]) -> EnvResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                // EOF：返回已读到的部分。BufReader 不会记住 EOF 状态，
                // 下一次 read 会重新向内核要数据，能读到之后追加进来的内容。
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EnvError::io(&self.path, e)),
            }
        }
        Ok(filled)
    }

    fn skip(&mut self, n: u64) -> EnvResult<()> {
        let offset = i64::try_from(n).map_err(|_| {
            EnvError::io(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "skip distance overflows i64"),
            )
        })?;
        self.reader
            .seek_relative(offset)
            .map_err(|e| EnvError::io(&self.path, e))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    fn open(path: &Path) -> PosixSequentialFile {
        PosixSequentialFile::new(path.to_path_buf(), File::open(path).unwrap())
    }

    #[test]
    fn test_read_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.log");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut file = open(&path);
        let mut buf = [0u8; 3];
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"012");

        file.skip(4).unwrap();
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"789");
    }

    #[test]
    fn test_short_read_at_eof_is_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.log");
        std::fs::write(&path, b"abc").unwrap();

        let mut file = open(&path);
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_after_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.log");
        std::fs::write(&path, b"head").unwrap();

        let mut file = open(&path);
        let mut buf = [0u8; 16];
        assert_eq!(file.read(&mut buf).unwrap(), 4);

        // 到达 EOF 之后有新数据追加进来，应该可以继续读
        let mut appender = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        appender.write_all(b"tail").unwrap();

        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"tail");
    }

    #[test]
    fn test_skip_on_pipe_fails() {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let read_end = unsafe { <File as std::os::unix::io::FromRawFd>::from_raw_fd(fds[0]) };
        let _write_end = unsafe { <File as std::os::unix::io::FromRawFd>::from_raw_fd(fds[1]) };

        let mut file = PosixSequentialFile::new(PathBuf::from("pipe"), read_end);
        let err = file.skip(10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.raw_os_error(), Some(libc::ESPIPE));
    }
}
