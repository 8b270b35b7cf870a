//! Single running instance guard.

use std::{io, path::Path};

/// Held for as long as this process owns the instance name. Released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    #[allow(dead_code)]
    inner: imp::NativeLock,
}

impl InstanceLock {
    /// Probes the lock once without waiting. `Ok(None)` means another process holds it.
    ///
    /// `lock_dir` hosts the lock file on platforms that lock files; Windows uses
    /// a named mutex instead and ignores it.
    pub fn try_acquire(lock_dir: &Path, name: &str) -> io::Result<Option<Self>> {
        Ok(imp::NativeLock::try_acquire(lock_dir, name)?.map(|inner| Self { inner }))
    }
}

#[cfg(unix)]
mod imp {
    use std::{
        fs::{self, File, OpenOptions},
        io,
        os::unix::io::AsRawFd,
        path::Path,
    };

    #[derive(Debug)]
    pub struct NativeLock {
        file: File,
    }

    impl NativeLock {
        pub fn try_acquire(lock_dir: &Path, name: &str) -> io::Result<Option<Self>> {
            fs::create_dir_all(lock_dir)?;
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(lock_dir.join(format!("{name}.lock")))?;

            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc == 0 {
                return Ok(Some(Self { file }));
            }

            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(err)
            }
        }
    }

    impl Drop for NativeLock {
        fn drop(&mut self) {
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::{io, path::Path};

    use windows::Win32::Foundation::{
        BOOL, CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE,
    };
    use windows::Win32::System::Threading::CreateMutexW;
    use windows::core::PCWSTR;

    #[derive(Debug)]
    pub struct NativeLock {
        handle: HANDLE,
    }

    impl NativeLock {
        pub fn try_acquire(_lock_dir: &Path, name: &str) -> io::Result<Option<Self>> {
            let wide: Vec<u16> = format!("Local\\{name}")
                .encode_utf16()
                .chain(std::iter::once(0))
                .collect();

            let handle = unsafe { CreateMutexW(None, BOOL::from(true), PCWSTR(wide.as_ptr())) }
                .map_err(|e| io::Error::other(e.to_string()))?;

            if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
                unsafe {
                    let _ = CloseHandle(handle);
                }
                return Ok(None);
            }
            Ok(Some(Self { handle }))
        }
    }

    impl Drop for NativeLock {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}
