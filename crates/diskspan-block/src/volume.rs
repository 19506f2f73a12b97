//! Volume driver
//!
//! Owns one session against the remote disk service: the mount and
//! write-permission state machine, plus the translation of logical byte
//! ranges into per-block seek/read/write operations, with the block cache
//! consulted in front of every remote fetch.

use diskspan_client::{DiskClient, Response, Transport};
use diskspan_proto::{Block, Command, Operation, TOTAL_SIZE};
use tracing::{debug, info};

use crate::MAX_IO_LEN;
use crate::addr::segments;
use crate::cache::BlockCache;
use crate::error::{VolumeError, VolumeResult};

/// Session flags for one volume connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Whether the volume is mounted
    pub mounted: bool,
    /// Whether writes are currently permitted
    pub write_permitted: bool,
}

/// Driver for one logical volume session
///
/// All I/O is synchronous; every call blocks until the remote round trips
/// complete. The driver issues exactly one request at a time, so callers
/// sharing a driver across threads must add their own mutual exclusion.
pub struct VolumeDriver<T: Transport> {
    client: DiskClient<T>,
    cache: BlockCache,
    session: SessionState,
}

impl<T: Transport> VolumeDriver<T> {
    /// Build a driver over a connected client.
    ///
    /// The cache starts disabled; enable it through
    /// `cache_mut().create(..)`.
    pub fn new(client: DiskClient<T>) -> Self {
        Self::with_cache(client, BlockCache::new())
    }

    /// Build a driver with a pre-configured cache
    pub fn with_cache(client: DiskClient<T>, cache: BlockCache) -> Self {
        Self {
            client,
            cache,
            session: SessionState::default(),
        }
    }

    /// Current session flags
    pub fn session(&self) -> SessionState {
        self.session
    }

    /// The front-side cache
    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// The front-side cache, for configuration
    pub fn cache_mut(&mut self) -> &mut BlockCache {
        &mut self.cache
    }

    /// The underlying protocol client
    pub fn client_mut(&mut self) -> &mut DiskClient<T> {
        &mut self.client
    }

    /// Mount the volume
    pub fn mount(&mut self) -> VolumeResult<()> {
        if self.session.mounted {
            return Err(VolumeError::AlreadyMounted);
        }
        self.issue(Operation::control(Command::Mount), None)?;
        self.session.mounted = true;
        info!("volume mounted");
        Ok(())
    }

    /// Unmount the volume, dropping any write permission with it
    pub fn unmount(&mut self) -> VolumeResult<()> {
        if !self.session.mounted {
            return Err(VolumeError::NotMounted);
        }
        self.issue(Operation::control(Command::Unmount), None)?;
        self.session.mounted = false;
        self.session.write_permitted = false;
        info!("volume unmounted");
        Ok(())
    }

    /// Ask the service for write permission
    pub fn grant_write(&mut self) -> VolumeResult<()> {
        if !self.session.mounted {
            return Err(VolumeError::NotMounted);
        }
        self.issue(Operation::control(Command::GrantWrite), None)?;
        self.session.write_permitted = true;
        Ok(())
    }

    /// Hand write permission back
    pub fn revoke_write(&mut self) -> VolumeResult<()> {
        if !self.session.mounted {
            return Err(VolumeError::NotMounted);
        }
        self.issue(Operation::control(Command::RevokeWrite), None)?;
        self.session.write_permitted = false;
        Ok(())
    }

    /// Read `buf.len()` bytes starting at logical address `addr`.
    ///
    /// Whole blocks fetched remotely are admitted to the cache on the way
    /// through. When a remote failure aborts the range mid-way, bytes
    /// already copied stay in `buf`.
    pub fn read(&mut self, addr: u64, buf: &mut [u8]) -> VolumeResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.check_range(addr, buf.len())?;

        let mut copied = 0;
        for seg in segments(addr, buf.len()) {
            let data = match self.cache.lookup(seg.disk, seg.block) {
                Ok(data) => data,
                Err(_) => {
                    let data = self.fetch_block(seg.disk, seg.block)?;
                    if let Err(err) = self.cache.insert(seg.disk, seg.block, &data) {
                        debug!(%err, "cache insert skipped");
                    }
                    data
                }
            };
            buf[copied..copied + seg.len].copy_from_slice(&data[seg.offset..seg.offset + seg.len]);
            copied += seg.len;
        }
        Ok(copied)
    }

    /// Write `buf.len()` bytes starting at logical address `addr`.
    ///
    /// Sub-block pieces are read-modify-write: the existing block is
    /// fetched, spliced, and written back whole. Each persisted block is
    /// pushed into the cache so a cached copy never trails the remote
    /// contents.
    pub fn write(&mut self, addr: u64, buf: &[u8]) -> VolumeResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.check_range(addr, buf.len())?;
        if !self.session.write_permitted {
            return Err(VolumeError::PermissionDenied);
        }

        let mut consumed = 0;
        for seg in segments(addr, buf.len()) {
            let mut data = self.fetch_block(seg.disk, seg.block)?;
            data[seg.offset..seg.offset + seg.len]
                .copy_from_slice(&buf[consumed..consumed + seg.len]);
            self.seek(seg.disk, seg.block)?;
            self.issue(Operation::control(Command::WriteBlock), Some(&data))?;
            self.cache.update(seg.disk, seg.block, &data);
            consumed += seg.len;
        }
        Ok(consumed)
    }

    fn check_range(&self, addr: u64, len: usize) -> VolumeResult<()> {
        if !self.session.mounted {
            return Err(VolumeError::NotMounted);
        }
        let end = addr.checked_add(len as u64);
        if len > MAX_IO_LEN || end.is_none_or(|end| end > TOTAL_SIZE) {
            return Err(VolumeError::InvalidRequest { addr, len });
        }
        Ok(())
    }

    /// Position the remote cursor at (disk, block)
    fn seek(&mut self, disk: u8, block: u8) -> VolumeResult<()> {
        self.issue(Operation::seek_disk(disk)?, None)?;
        self.issue(Operation::seek_block(block), None)?;
        Ok(())
    }

    /// Seek the remote cursor and read the whole block under it
    fn fetch_block(&mut self, disk: u8, block: u8) -> VolumeResult<Block> {
        self.seek(disk, block)?;
        let resp = self.issue(Operation::control(Command::ReadBlock), None)?;
        resp.block.ok_or(VolumeError::MissingPayload {
            op: Command::ReadBlock,
        })
    }

    /// Send one operation and insist on a zero return code
    fn issue(&mut self, op: Operation, payload: Option<&[u8]>) -> VolumeResult<Response> {
        let resp = self.client.send_operation(op, payload)?;
        if resp.code != 0 {
            return Err(VolumeError::RemoteRejected {
                op: op.command,
                code: resp.code,
            });
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;
    use diskspan_client::ClientError;
    use diskspan_proto::{BLOCK_SIZE, BLOCKS_PER_DISK, DISK_SIZE, FLAG_PAYLOAD, HEADER_LEN, NUM_DISKS};
    use rand::RngCore;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    /// In-memory disk service speaking the wire protocol over `Transport`.
    ///
    /// Implements the eight commands with the server-side cursor contract:
    /// seeks set the cursor, block I/O acts on the block under it.
    struct FakeDiskService {
        disks: Vec<Vec<u8>>,
        cursor_disk: usize,
        cursor_block: usize,
        mounted: bool,
        write_ok: bool,
        inbound: Vec<u8>,
        outbound: Vec<u8>,
        ops: Vec<Command>,
        /// Fail every `recv` once this many operations were processed
        fail_recv_after: Option<usize>,
    }

    impl FakeDiskService {
        fn new() -> Self {
            Self {
                disks: vec![vec![0u8; DISK_SIZE as usize]; usize::from(NUM_DISKS)],
                cursor_disk: 0,
                cursor_block: 0,
                mounted: false,
                write_ok: false,
                inbound: Vec::new(),
                outbound: Vec::new(),
                ops: Vec::new(),
                fail_recv_after: None,
            }
        }

        fn count(&self, command: Command) -> usize {
            self.ops.iter().filter(|&&c| c == command).count()
        }

        fn poke(&mut self, addr: u64, data: &[u8]) {
            let disk = (addr / DISK_SIZE) as usize;
            let offset = (addr % DISK_SIZE) as usize;
            self.disks[disk][offset..offset + data.len()].copy_from_slice(data);
        }

        fn peek(&self, addr: u64, len: usize) -> Vec<u8> {
            let disk = (addr / DISK_SIZE) as usize;
            let offset = (addr % DISK_SIZE) as usize;
            self.disks[disk][offset..offset + len].to_vec()
        }

        fn pump(&mut self) {
            loop {
                if self.inbound.len() < HEADER_LEN {
                    return;
                }
                let word = u32::from_be_bytes(self.inbound[..4].try_into().unwrap());
                let has_payload = self.inbound[4] & FLAG_PAYLOAD != 0;
                let frame_len = HEADER_LEN + if has_payload { BLOCK_SIZE } else { 0 };
                if self.inbound.len() < frame_len {
                    return;
                }
                let payload: Option<Block> = has_payload
                    .then(|| self.inbound[HEADER_LEN..frame_len].try_into().unwrap());
                self.inbound.drain(..frame_len);

                let op = Operation::decode(word).expect("client sent a malformed word");
                self.apply(op, payload);
            }
        }

        fn apply(&mut self, op: Operation, payload: Option<Block>) {
            self.ops.push(op.command);
            let (code, block) = match op.command {
                Command::Mount => {
                    if self.mounted {
                        (-1, None)
                    } else {
                        self.mounted = true;
                        (0, None)
                    }
                }
                Command::Unmount => {
                    if self.mounted {
                        self.mounted = false;
                        self.write_ok = false;
                        (0, None)
                    } else {
                        (-1, None)
                    }
                }
                Command::GrantWrite => {
                    self.write_ok = true;
                    (0, None)
                }
                Command::RevokeWrite => {
                    self.write_ok = false;
                    (0, None)
                }
                Command::SeekDisk => {
                    self.cursor_disk = usize::from(op.disk_id);
                    (0, None)
                }
                Command::SeekBlock => {
                    self.cursor_block = usize::from(op.block_id);
                    (0, None)
                }
                Command::ReadBlock => {
                    let start = self.cursor_block * BLOCK_SIZE;
                    let block: Block = self.disks[self.cursor_disk][start..start + BLOCK_SIZE]
                        .try_into()
                        .unwrap();
                    (0, Some(block))
                }
                Command::WriteBlock => match payload {
                    Some(data) if self.write_ok => {
                        let start = self.cursor_block * BLOCK_SIZE;
                        self.disks[self.cursor_disk][start..start + BLOCK_SIZE]
                            .copy_from_slice(&data);
                        (0, None)
                    }
                    _ => (-1, None),
                },
            };

            self.outbound.extend_from_slice(&i32::to_be_bytes(code));
            self.outbound
                .push(if block.is_some() { FLAG_PAYLOAD } else { 0 });
            if let Some(block) = block {
                self.outbound.extend_from_slice(&block);
            }
        }
    }

    /// Shared handle so tests can inspect the service the driver owns
    #[derive(Clone)]
    struct SharedService(Rc<RefCell<FakeDiskService>>);

    impl SharedService {
        fn new() -> Self {
            Self(Rc::new(RefCell::new(FakeDiskService::new())))
        }
    }

    impl Transport for SharedService {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut service = self.0.borrow_mut();
            service.inbound.extend_from_slice(buf);
            service.pump();
            Ok(buf.len())
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut service = self.0.borrow_mut();
            if let Some(limit) = service.fail_recv_after
                && service.ops.len() > limit
            {
                return Err(io::Error::from(io::ErrorKind::ConnectionReset));
            }
            if service.outbound.is_empty() {
                return Ok(0);
            }
            let n = buf.len().min(service.outbound.len());
            buf[..n].copy_from_slice(&service.outbound[..n]);
            service.outbound.drain(..n);
            Ok(n)
        }
    }

    fn driver(service: &SharedService) -> VolumeDriver<SharedService> {
        VolumeDriver::new(DiskClient::new(service.clone()))
    }

    fn mounted_driver(service: &SharedService) -> VolumeDriver<SharedService> {
        let mut driver = driver(service);
        driver.mount().unwrap();
        driver
    }

    #[test]
    fn test_operations_require_mount() {
        let service = SharedService::new();
        let mut driver = driver(&service);
        let mut buf = [0u8; 8];

        assert!(matches!(
            driver.read(0, &mut buf),
            Err(VolumeError::NotMounted)
        ));
        assert!(matches!(
            driver.write(0, &buf),
            Err(VolumeError::NotMounted)
        ));
        assert!(matches!(driver.grant_write(), Err(VolumeError::NotMounted)));
        assert!(matches!(driver.revoke_write(), Err(VolumeError::NotMounted)));
        assert!(matches!(driver.unmount(), Err(VolumeError::NotMounted)));

        // Nothing reached the wire.
        assert!(service.0.borrow().ops.is_empty());
    }

    #[test]
    fn test_mount_state_machine() {
        let service = SharedService::new();
        let mut driver = driver(&service);

        driver.mount().unwrap();
        assert!(driver.session().mounted);
        assert!(matches!(driver.mount(), Err(VolumeError::AlreadyMounted)));

        driver.unmount().unwrap();
        assert!(!driver.session().mounted);
        driver.mount().unwrap();
    }

    #[test]
    fn test_unmount_revokes_write_permission() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);
        driver.grant_write().unwrap();
        assert!(driver.session().write_permitted);

        driver.unmount().unwrap();
        driver.mount().unwrap();

        let data = [0u8; 4];
        assert!(matches!(
            driver.write(0, &data),
            Err(VolumeError::PermissionDenied)
        ));
    }

    #[test]
    fn test_revoke_write_blocks_writes() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);
        driver.grant_write().unwrap();
        driver.revoke_write().unwrap();

        assert!(matches!(
            driver.write(0, &[1, 2, 3]),
            Err(VolumeError::PermissionDenied)
        ));
    }

    #[test]
    fn test_remote_rejection_surfaces() {
        let service = SharedService::new();
        service.0.borrow_mut().mounted = true;

        let mut driver = driver(&service);
        assert!(matches!(
            driver.mount(),
            Err(VolumeError::RemoteRejected {
                op: Command::Mount,
                code: -1
            })
        ));
        // The rejected mount leaves the session unmounted.
        assert!(!driver.session().mounted);
    }

    #[test]
    fn test_empty_requests_succeed_unvalidated() {
        let service = SharedService::new();
        let mut driver = driver(&service);

        // Zero-length I/O short-circuits before any validation.
        assert_eq!(driver.read(0, &mut []).unwrap(), 0);
        assert_eq!(driver.write(0, &[]).unwrap(), 0);
        assert!(service.0.borrow().ops.is_empty());
    }

    #[test]
    fn test_request_validation() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);
        driver.grant_write().unwrap();

        let mut oversized = vec![0u8; MAX_IO_LEN + 1];
        assert!(matches!(
            driver.read(0, &mut oversized),
            Err(VolumeError::InvalidRequest { .. })
        ));
        assert!(matches!(
            driver.write(0, &oversized),
            Err(VolumeError::InvalidRequest { .. })
        ));

        let mut buf = [0u8; 16];
        assert!(matches!(
            driver.read(TOTAL_SIZE - 8, &mut buf),
            Err(VolumeError::InvalidRequest { .. })
        ));
        assert!(matches!(
            driver.read(u64::MAX, &mut buf),
            Err(VolumeError::InvalidRequest { .. })
        ));

        // The full request cap at the very end of the volume is fine.
        let mut max = vec![0u8; MAX_IO_LEN];
        assert_eq!(
            driver.read(TOTAL_SIZE - MAX_IO_LEN as u64, &mut max).unwrap(),
            MAX_IO_LEN
        );
    }

    #[test]
    fn test_round_trip_spanning_blocks() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);
        driver.grant_write().unwrap();

        let mut data = [0u8; 600];
        rand::thread_rng().fill_bytes(&mut data);

        // Nonzero offset, three blocks touched.
        let addr = BLOCK_SIZE as u64 + 17;
        assert_eq!(driver.write(addr, &data).unwrap(), data.len());

        let mut back = [0u8; 600];
        assert_eq!(driver.read(addr, &mut back).unwrap(), back.len());
        assert_eq!(back, data);
    }

    #[test]
    fn test_round_trip_spanning_disks() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);
        driver.grant_write().unwrap();

        let data: Vec<u8> = (0..64).map(|i| i as u8 ^ 0x5a).collect();
        let addr = DISK_SIZE - 30;
        driver.write(addr, &data).unwrap();

        let mut back = vec![0u8; data.len()];
        driver.read(addr, &mut back).unwrap();
        assert_eq!(back, data);

        // The bytes really landed on both disks.
        let service = service.0.borrow();
        assert_eq!(service.peek(addr, 30), data[..30]);
        assert_eq!(service.peek(DISK_SIZE, 34), data[30..]);
    }

    #[test]
    fn test_sub_block_write_preserves_neighbors() {
        let service = SharedService::new();
        service.0.borrow_mut().poke(0, &[0xee; 2 * BLOCK_SIZE]);

        let mut driver = mounted_driver(&service);
        driver.grant_write().unwrap();
        driver.write(3, &[1, 2, 3, 4, 5]).unwrap();

        let mut back = [0u8; 16];
        driver.read(0, &mut back).unwrap();
        assert_eq!(&back[..3], &[0xee, 0xee, 0xee]);
        assert_eq!(&back[3..8], &[1, 2, 3, 4, 5]);
        assert_eq!(&back[8..], &[0xee; 8]);
    }

    #[test]
    fn test_cache_serves_repeated_reads() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);
        driver.cache_mut().create(16).unwrap();

        let mut buf = [0u8; 64];
        driver.read(100, &mut buf).unwrap();
        assert_eq!(service.0.borrow().count(Command::ReadBlock), 1);

        // The second read is served locally.
        driver.read(100, &mut buf).unwrap();
        driver.read(120, &mut buf).unwrap();
        assert_eq!(service.0.borrow().count(Command::ReadBlock), 1);

        let stats = driver.cache().stats();
        assert_eq!((stats.queries, stats.hits), (3, 2));
    }

    #[test]
    fn test_write_keeps_cache_coherent() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);
        driver.cache_mut().create(16).unwrap();
        driver.grant_write().unwrap();

        let mut buf = [0u8; 32];
        driver.read(0, &mut buf).unwrap();

        let fresh = [0xabu8; 32];
        driver.write(0, &fresh).unwrap();

        // One fetch for the initial read, one for the read-modify-write;
        // the final read must hit the updated cache entry.
        driver.read(0, &mut buf).unwrap();
        assert_eq!(buf, fresh);
        assert_eq!(service.0.borrow().count(Command::ReadBlock), 2);
    }

    #[test]
    fn test_disabled_cache_goes_remote_every_time() {
        let service = SharedService::new();
        let mut driver = mounted_driver(&service);

        let mut buf = [0u8; 16];
        driver.read(0, &mut buf).unwrap();
        driver.read(0, &mut buf).unwrap();
        assert_eq!(service.0.borrow().count(Command::ReadBlock), 2);
    }

    #[test]
    fn test_eviction_policy_reaches_through_driver() {
        let service = SharedService::new();
        let client = DiskClient::new(service.clone());
        let mut driver = VolumeDriver::with_cache(
            client,
            BlockCache::with_policy(EvictionPolicy::LeastRecentlyTouched),
        );
        driver.mount().unwrap();
        driver.cache_mut().create(2).unwrap();

        let mut block = [0u8; BLOCK_SIZE];
        driver.read(0, &mut block).unwrap();
        driver.read(BLOCK_SIZE as u64, &mut block).unwrap();
        driver.read(2 * BLOCK_SIZE as u64, &mut block).unwrap();

        // Block 0 was the least recently touched, so re-reading it goes
        // remote while block 2 is still cached.
        let before = service.0.borrow().count(Command::ReadBlock);
        driver.read(2 * BLOCK_SIZE as u64, &mut block).unwrap();
        assert_eq!(service.0.borrow().count(Command::ReadBlock), before);
        driver.read(0, &mut block).unwrap();
        assert_eq!(service.0.borrow().count(Command::ReadBlock), before + 1);
    }

    #[test]
    fn test_transport_failure_keeps_partial_progress() {
        let service = SharedService::new();
        service.0.borrow_mut().poke(0, &[0x42; BLOCK_SIZE]);

        let mut driver = mounted_driver(&service);
        // Allow the first segment's seek/seek/read plus the mount, then die.
        service.0.borrow_mut().fail_recv_after = Some(4);

        let mut buf = [0u8; 3 * BLOCK_SIZE];
        let result = driver.read(0, &mut buf);
        assert!(matches!(result, Err(VolumeError::Client(ClientError::Io(_)))));

        // The first block landed before the failure and is left in place.
        assert_eq!(&buf[..BLOCK_SIZE], &[0x42; BLOCK_SIZE]);
        assert_eq!(&buf[BLOCK_SIZE..], &[0u8; 2 * BLOCK_SIZE]);
    }

    #[test]
    fn test_block_count_matches_geometry() {
        // The fake's storage and the wire geometry agree.
        assert_eq!(
            u64::from(NUM_DISKS) * u64::from(BLOCKS_PER_DISK) * BLOCK_SIZE as u64,
            TOTAL_SIZE
        );
    }
}
