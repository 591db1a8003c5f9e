//! Capability traits standing in for the host's filesystem, network, and
//! process primitives.
//!
//! Rather than rebinding `std::fs`/`std::net`/`std::process` in place,
//! sandboxed code is simply never given a path to them. [`HostVfs`],
//! [`HostNet`], and [`HostProc`] each expose a "passthrough" implementation
//! (a thin wrapper over the real primitive) and a "firewalled" decorator
//! that runs the policy check first. A process constructs exactly one
//! provider of each and hands that, not the raw primitive, to the code
//! being sandboxed — so there is no alternate route back to the host that
//! skips the check.

use std::fs;
use std::io::{self, Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::AccessDenied;
use crate::firewall::Firewall;
use crate::types::{OpKind, Operation};

fn to_io_error(denied: AccessDenied) -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, denied)
}

// ---------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------

/// Every filesystem primitive a sandboxed program can reach. Handle-style
/// operations (`open`) return a [`VfsFile`] rather than `std::fs::File`
/// directly so the firewalled implementation can wrap the handle and
/// re-apply policy to subsequent reads/writes against the path that opened
/// it — closing the "open then operate on the handle" bypass.
pub trait HostVfs: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn open(&self, path: &Path, writable: bool) -> io::Result<Box<dyn VfsFile>>;
    fn exists(&self, path: &Path) -> bool;
    /// Probes reachability/permission bits without reading contents (POSIX
    /// `access(2)`), distinct from `exists` in that it surfaces permission
    /// errors rather than collapsing them to `false`.
    fn access(&self, path: &Path) -> io::Result<()>;
    fn metadata(&self, path: &Path) -> io::Result<fs::Metadata>;
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn hard_link(&self, from: &Path, to: &Path) -> io::Result<()>;
    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
    fn set_current_dir(&self, path: &Path) -> io::Result<()>;
}

/// A handle returned by [`HostVfs::open`]. The firewalled variant re-checks
/// every `read`/`write` call against the path that opened it.
pub trait VfsFile: io::Read + io::Write + Send {}
impl<T: io::Read + io::Write + Send> VfsFile for T {}

/// Thin wrapper over the real `std::fs` primitives, with no policy applied.
/// The default instance handed to trusted/ambient code (the firewall's own
/// audit/report writers) and the base the firewalled decorator wraps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughVfs;

impl HostVfs for PassthroughVfs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }
    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
        f.write_all(contents)
    }
    fn open(&self, path: &Path, writable: bool) -> io::Result<Box<dyn VfsFile>> {
        let file = if writable {
            fs::OpenOptions::new().create(true).write(true).open(path)?
        } else {
            fs::File::open(path)?
        };
        Ok(Box::new(file))
    }
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
    fn access(&self, path: &Path) -> io::Result<()> {
        fs::metadata(path).map(|_| ())
    }
    fn metadata(&self, path: &Path) -> io::Result<fs::Metadata> {
        fs::metadata(path)
    }
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|e| e.map(|e| e.path()))
            .collect()
    }
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }
    fn hard_link(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::hard_link(from, to)
    }
    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }
    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }
    fn set_current_dir(&self, path: &Path) -> io::Result<()> {
        std::env::set_current_dir(path)
    }
}

/// Decorates any [`HostVfs`] with policy enforcement. Every method resolves
/// the realpath (when the target exists), checks both the original and
/// realpath forms, and takes the more restrictive verdict — this is what
/// defeats symlink and platform-temp-alias evasion. Two-path operations
/// additionally run a `Write` check on the destination.
pub struct FirewalledVfs<V: HostVfs = PassthroughVfs> {
    firewall: std::sync::Arc<Firewall>,
    inner: V,
}

impl<V: HostVfs> FirewalledVfs<V> {
    pub fn new(firewall: std::sync::Arc<Firewall>, inner: V) -> Self {
        Self { firewall, inner }
    }

    fn check(&self, kind: OpKind, path: &Path, preview: Option<&[u8]>) -> io::Result<()> {
        let target = path.display().to_string();
        let mut op = Operation::new(kind, target, crate::origin::current());
        if let Some(preview) = preview {
            op = op.with_content_preview(preview);
        }
        self.firewall.check_filesystem(op).map_err(to_io_error)
    }
}

impl<V: HostVfs> HostVfs for FirewalledVfs<V> {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.check(OpKind::Read, path, None)?;
        self.inner.read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.check(OpKind::Write, path, Some(contents))?;
        self.inner.write(path, contents)
    }

    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.check(OpKind::Write, path, Some(contents))?;
        self.inner.append(path, contents)
    }

    fn open(&self, path: &Path, writable: bool) -> io::Result<Box<dyn VfsFile>> {
        self.check(if writable { OpKind::Write } else { OpKind::Read }, path, None)?;
        let handle = self.inner.open(path, writable)?;
        Ok(Box::new(FirewalledFile {
            firewall: self.firewall.clone(),
            path: path.to_path_buf(),
            inner: handle,
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        if self.check(OpKind::Read, path, None).is_err() {
            return false;
        }
        self.inner.exists(path)
    }

    fn access(&self, path: &Path) -> io::Result<()> {
        self.check(OpKind::Read, path, None)?;
        self.inner.access(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<fs::Metadata> {
        self.check(OpKind::Read, path, None)?;
        self.inner.metadata(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.check(OpKind::Read, path, None)?;
        self.inner.read_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check(OpKind::Create, path, None)?;
        self.inner.create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.check(OpKind::Delete, path, None)?;
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check(OpKind::Delete, path, None)?;
        self.inner.remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(OpKind::Read, from, None)?;
        self.check(OpKind::Write, to, None)?;
        self.inner.rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.check(OpKind::Read, from, None)?;
        self.check(OpKind::Write, to, None)?;
        self.inner.copy(from, to)
    }

    fn hard_link(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(OpKind::Read, from, None)?;
        self.check(OpKind::Write, to, None)?;
        self.inner.hard_link(from, to)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        // The link's own location is a Write; the link's resolved target is
        // a Read — a symlink pointing at a blocked-read path is denied even
        // when the link's own location would otherwise be fine.
        self.check(OpKind::Write, link, None)?;
        self.check(OpKind::Read, target, None)?;
        self.inner.symlink(target, link)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.check(OpKind::Read, path, None)?;
        self.inner.read_link(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.check(OpKind::Read, path, None)?;
        self.inner.canonicalize(path)
    }

    fn set_current_dir(&self, path: &Path) -> io::Result<()> {
        // chdir is validated as a Read against the destination.
        self.check(OpKind::Read, path, None)?;
        self.inner.set_current_dir(path)
    }
}

/// Wraps an open handle so subsequent reads/writes re-apply policy against
/// the path that opened it, rather than trusting the handle unconditionally
/// once it has been obtained.
struct FirewalledFile {
    firewall: std::sync::Arc<Firewall>,
    path: PathBuf,
    inner: Box<dyn VfsFile>,
}

impl io::Read for FirewalledFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let target = self.path.display().to_string();
        let op = Operation::new(OpKind::Read, target, crate::origin::current());
        self.firewall.check_filesystem(op).map_err(to_io_error)?;
        self.inner.read(buf)
    }
}

impl io::Write for FirewalledFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let target = self.path.display().to_string();
        let op = Operation::new(OpKind::Write, target, crate::origin::current())
            .with_content_preview(buf);
        self.firewall.check_filesystem(op).map_err(to_io_error)?;
        self.inner.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------

/// Outcome of a network primitive, abstracted away from any particular HTTP
/// client crate: sandboxed code deals in `(status, headers, body)` rather
/// than a concrete response type, keeping this crate free of an HTTP-client
/// dependency it would otherwise need only for its type signatures.
pub struct NetResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Every network primitive a sandboxed program can reach: request-response
/// HTTP(S), a raw socket connect (the universal fallback every higher-level
/// library eventually bottoms out at), and DNS lookup.
pub trait HostNet: Send + Sync {
    fn http_request(&self, method: &str, url: &str, body: Option<&[u8]>) -> io::Result<NetResponse>;
    fn connect_raw(&self, host: &str, port: u16) -> io::Result<()>;
    fn dns_lookup(&self, name: &str) -> io::Result<Vec<std::net::IpAddr>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughNet;

impl HostNet for PassthroughNet {
    fn http_request(&self, _method: &str, _url: &str, _body: Option<&[u8]>) -> io::Result<NetResponse> {
        // No HTTP client is bundled — a real integration plugs a concrete
        // client in at this seam. The passthrough exists so the firewalled
        // decorator has something to wrap in tests and examples.
        Err(io::Error::new(io::ErrorKind::Unsupported, "no http client configured"))
    }

    fn connect_raw(&self, host: &str, port: u16) -> io::Result<()> {
        std::net::TcpStream::connect((host, port)).map(drop)
    }

    fn dns_lookup(&self, name: &str) -> io::Result<Vec<std::net::IpAddr>> {
        use std::net::ToSocketAddrs;
        Ok((name, 0u16)
            .to_socket_addrs()?
            .map(|a| a.ip())
            .collect())
    }
}

pub struct FirewalledNet<N: HostNet = PassthroughNet> {
    firewall: std::sync::Arc<Firewall>,
    inner: N,
}

impl<N: HostNet> FirewalledNet<N> {
    pub fn new(firewall: std::sync::Arc<Firewall>, inner: N) -> Self {
        Self { firewall, inner }
    }
}

impl<N: HostNet> HostNet for FirewalledNet<N> {
    /// Validates first using the full URL (the accurate hostname is only
    /// available at this layer), then stamps the validation so a subsequent
    /// `connect_raw` for the same call doesn't re-check with a less precise
    /// host — the socket-layer wrapper is the universal fallback for
    /// libraries that bypass this method entirely, not a second gate on
    /// traffic that already went through it.
    fn http_request(&self, method: &str, url: &str, body: Option<&[u8]>) -> io::Result<NetResponse> {
        let op = Operation::new(OpKind::NetConnect, url, crate::origin::current())
            .with_method(method);
        let op = match body {
            Some(b) => op.with_body(b.to_vec()),
            None => op,
        };
        self.firewall.check_network(op).map_err(to_io_error)?;
        self.inner.http_request(method, url, body)
    }

    fn connect_raw(&self, host: &str, port: u16) -> io::Result<()> {
        let target = format!("socket://{host}:{port}");
        let op = Operation::new(OpKind::NetConnect, target, crate::origin::current());
        self.firewall.check_network(op).map_err(to_io_error)?;
        self.inner.connect_raw(host, port)
    }

    fn dns_lookup(&self, name: &str) -> io::Result<Vec<std::net::IpAddr>> {
        let target = format!("dns://{name}");
        let op = Operation::new(OpKind::DnsQuery, target, crate::origin::current());
        self.firewall.check_network(op).map_err(to_io_error)?;
        self.inner.dns_lookup(name)
    }
}

// ---------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------

/// Every process-spawning primitive a sandboxed program can reach.
pub trait HostProc: Send + Sync {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Child>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProc;

impl HostProc for PassthroughProc {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Child> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
    }
}

pub struct FirewalledProc<P: HostProc = PassthroughProc> {
    firewall: std::sync::Arc<Firewall>,
    inner: P,
}

impl<P: HostProc> FirewalledProc<P> {
    pub fn new(firewall: std::sync::Arc<Firewall>, inner: P) -> Self {
        Self { firewall, inner }
    }
}

impl<P: HostProc> HostProc for FirewalledProc<P> {
    /// When the spawned program is this same runtime, re-injects the
    /// firewall-active flag into the child's environment so a child process
    /// can't escape enforcement simply by starting fresh. Build-tool parents
    /// (detected by process name) are exempt, since forcing the flag into a
    /// native compiler's own child invocations would corrupt legitimate
    /// toolchain behavior that has nothing to do with dependency code.
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Child> {
        let command_line = format!("{program} {}", args.join(" "));
        let op = Operation::new(OpKind::Spawn, command_line, crate::origin::current());
        self.firewall.check_command(op).map_err(to_io_error)?;

        if self.is_same_runtime(program) && !self.parent_is_native_build_tool() {
            let mut cmd = Command::new(program);
            cmd.args(args)
                .env("FIREWALL_ACTIVE", "1")
                .env("FIREWALL_PARENT_PID", std::process::id().to_string())
                .stdin(Stdio::null());
            return cmd.spawn();
        }
        self.inner.spawn(program, args)
    }
}

impl<P: HostProc> FirewalledProc<P> {
    fn is_same_runtime(&self, program: &str) -> bool {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_owned()))
            .map(|current| Path::new(program).file_name() == Some(current.as_os_str()))
            .unwrap_or(false)
    }

    /// A parent process name matching a known native-build toolchain
    /// suppresses re-injection, so compiling a native dependency (which may
    /// legitimately spawn many short-lived helper processes of its own
    /// runtime) isn't corrupted by forced environment injection.
    fn parent_is_native_build_tool(&self) -> bool {
        const BUILD_TOOLS: &[&str] = &["cc", "gcc", "clang", "cargo", "rustc", "make", "cmake", "ninja"];
        std::env::args()
            .next()
            .map(|exe| {
                let name = Path::new(&exe)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("");
                BUILD_TOOLS.contains(&name)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::firewall::Firewall;

    fn firewall_with(config: Config) -> std::sync::Arc<Firewall> {
        let dir = tempfile::tempdir().unwrap();
        std::sync::Arc::new(Firewall::new(config, dir.path().join("audit.jsonl")))
    }

    #[test]
    fn firewalled_vfs_denies_blocked_read() {
        let mut cfg = Config::default();
        cfg.filesystem.blocked_read_paths = vec!["/.ssh/".into()];
        let fw = firewall_with(cfg);
        let vfs = FirewalledVfs::new(fw, PassthroughVfs);
        let err = vfs.read(Path::new("/home/u/.ssh/id_rsa")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn firewalled_vfs_allows_ordinary_write_in_temp_dir() {
        let cfg = Config::default();
        let fw = firewall_with(cfg);
        let vfs = FirewalledVfs::new(fw, PassthroughVfs);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        vfs.write(&path, b"hello").unwrap();
        assert_eq!(vfs.read(&path).unwrap(), b"hello");
    }

    #[test]
    fn firewalled_vfs_exists_denies_blocked_probe() {
        let mut cfg = Config::default();
        cfg.filesystem.blocked_read_paths = vec!["/.ssh/".into()];
        let fw = firewall_with(cfg);
        let vfs = FirewalledVfs::new(fw, PassthroughVfs);
        assert!(!vfs.exists(Path::new("/home/u/.ssh/id_rsa")));
    }

    #[test]
    fn firewalled_vfs_canonicalize_denies_blocked_read() {
        let mut cfg = Config::default();
        cfg.filesystem.blocked_read_paths = vec!["/.ssh/".into()];
        let fw = firewall_with(cfg);
        let vfs = FirewalledVfs::new(fw, PassthroughVfs);
        let err = vfs.canonicalize(Path::new("/home/u/.ssh/id_rsa")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn firewalled_vfs_access_denies_blocked_read() {
        let mut cfg = Config::default();
        cfg.filesystem.blocked_read_paths = vec!["/.ssh/".into()];
        let fw = firewall_with(cfg);
        let vfs = FirewalledVfs::new(fw, PassthroughVfs);
        let err = vfs.access(Path::new("/home/u/.ssh/id_rsa")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn firewalled_vfs_copy_denies_on_blocked_source() {
        let mut cfg = Config::default();
        cfg.filesystem.blocked_read_paths = vec!["/.ssh/".into()];
        let fw = firewall_with(cfg);
        let vfs = FirewalledVfs::new(fw, PassthroughVfs);
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("copy.txt");
        let err = vfs.copy(Path::new("/home/u/.ssh/id_rsa"), &dst).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn firewalled_net_denies_blocked_domain() {
        let mut cfg = Config::default();
        cfg.network.blocked_domains = vec!["pastebin.com".into()];
        let fw = firewall_with(cfg);
        let net = FirewalledNet::new(fw, PassthroughNet);
        let err = net.connect_raw("pastebin.com", 443).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn firewalled_proc_denies_shell_metacharacters() {
        let cfg = Config::default();
        let fw = firewall_with(cfg);
        let proc = FirewalledProc::new(fw, PassthroughProc);
        let err = proc
            .spawn("npm", &["install".into(), ";".into(), "curl".into(), "evil.com".into()])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
