//! Byte-exact wire codec for discovery and election-announcement frames.
//!
//! Both frame types serialize big-endian with no padding, no length prefix
//! and no framing; the transport delimits frames. Layouts:
//!
//! ```text
//! Discovery: msg_type:u8 | flag:u8 | sender:u32 | ttl:u8 | path_len:u16 |
//!            path_len x u32 | gps_available:u8 | (if available) x:f64 y:f64 z:f64
//!
//! Election:  discovery layout, then
//!            class_id:u16 | direct_connections:u32 | pdsf:u32 |
//!            score:f64 | hash:u32 | history_len:u16 | history_len x u32
//! ```
//!
//! Floats are IEEE-754 binary64. Compatibility with peer implementations
//! depends only on this byte layout; there are no optional fields and no
//! versioning tag.
//!
//! The codec never allocates: buffers are caller-supplied, paths and
//! histories live in fixed-capacity vectors, and `serialize` returns the
//! exact byte count written (which always equals `serialized_size`).

use heapless::Vec as BoundedVec;

use crate::error::Error;
use crate::types::{GpsLocation, MAX_PATH_HOPS};

/// Wire tag for a plain discovery frame.
pub const MESSAGE_TYPE_DISCOVERY: u8 = 0;
/// Wire tag for an election announcement.
pub const MESSAGE_TYPE_ELECTION_ANNOUNCEMENT: u8 = 1;

/// Fixed bytes of the discovery layout: tag, flag, sender, ttl, path_len
/// and the gps_available marker.
const DISCOVERY_FIXED_LEN: usize = 1 + 1 + 4 + 1 + 2 + 1;
/// Bytes occupied by an attached GPS location (three f64 coordinates).
const GPS_LEN: usize = 3 * 8;
/// Fixed bytes the election layout appends after the discovery layout.
const ELECTION_FIXED_LEN: usize = 2 + 4 + 4 + 8 + 4 + 2;

/// Upper bound on any serialized frame: an election announcement with a
/// full path, full history and GPS attached.
pub const MAX_FRAME_LEN: usize =
    DISCOVERY_FIXED_LEN + 4 * MAX_PATH_HOPS + GPS_LEN + ELECTION_FIXED_LEN + 4 * MAX_PATH_HOPS;

/// Ordered list of node ids a frame has visited, bounded at 50 hops.
pub type HopPath = BoundedVec<u32, MAX_PATH_HOPS>;

/// Per-hop unique-neighbor counts carried by election announcements.
pub type PdsfHistory = BoundedVec<u32, MAX_PATH_HOPS>;

/// A discovery frame, or the discovery part of an election announcement.
///
/// Well-formed frames carry the originating sender as `path[0]`, followed
/// by each hop that has re-broadcast the frame, in order. The attached GPS
/// is always the last hop's position (LHGPS); forwarding hops restamp it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryFrame {
    pub is_clusterhead: bool,
    pub sender_id: u32,
    pub ttl: u8,
    pub path: HopPath,
    /// Last hop's GPS. `gps.valid` doubles as the wire `gps_available` flag.
    pub gps: GpsLocation,
}

/// An election announcement: a discovery frame plus the election payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionFrame {
    pub discovery: DiscoveryFrame,
    pub class_id: u16,
    pub direct_connections: u32,
    /// Predicted devices so far; saturates at `u32::MAX`.
    pub pdsf: u32,
    /// Candidacy score in `[0, 1]`.
    pub score: f64,
    /// Slot-assignment hash of the originating candidate.
    pub hash: u32,
    pub pdsf_history: PdsfHistory,
}

/// A parsed frame of either type.
///
/// The message-type tag is the enum discriminant: serialization derives
/// the wire tag from the variant, so a frame can never carry a tag that
/// contradicts its own layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Discovery(DiscoveryFrame),
    Election(ElectionFrame),
}

impl DiscoveryFrame {
    fn body_size(&self) -> usize {
        let gps = if self.gps.valid { GPS_LEN } else { 0 };
        DISCOVERY_FIXED_LEN + 4 * self.path.len() + gps
    }
}

impl Frame {
    /// The discovery part shared by both frame types.
    pub fn discovery(&self) -> &DiscoveryFrame {
        match self {
            Frame::Discovery(d) => d,
            Frame::Election(e) => &e.discovery,
        }
    }

    /// Mutable access to the shared discovery part.
    pub fn discovery_mut(&mut self) -> &mut DiscoveryFrame {
        match self {
            Frame::Discovery(d) => d,
            Frame::Election(e) => &mut e.discovery,
        }
    }

    pub fn sender_id(&self) -> u32 {
        self.discovery().sender_id
    }

    pub fn ttl(&self) -> u8 {
        self.discovery().ttl
    }

    /// Exact number of bytes `serialize` writes for this frame.
    pub fn serialized_size(&self) -> usize {
        match self {
            Frame::Discovery(d) => d.body_size(),
            Frame::Election(e) => {
                e.discovery.body_size() + ELECTION_FIXED_LEN + 4 * e.pdsf_history.len()
            }
        }
    }

    /// Serialize the frame into `buf`, returning the byte count written.
    ///
    /// Fails with [`Error::BufferTooSmall`] when `buf` cannot hold the
    /// frame; nothing is written in that case.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let needed = self.serialized_size();
        if buf.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                got: buf.len(),
            });
        }

        let mut w = Writer::new(buf);
        let d = self.discovery();
        let tag = match self {
            Frame::Discovery(_) => MESSAGE_TYPE_DISCOVERY,
            Frame::Election(_) => MESSAGE_TYPE_ELECTION_ANNOUNCEMENT,
        };
        w.put_u8(tag);
        w.put_u8(u8::from(d.is_clusterhead));
        w.put_u32(d.sender_id);
        w.put_u8(d.ttl);
        w.put_u16(d.path.len() as u16);
        for hop in &d.path {
            w.put_u32(*hop);
        }
        w.put_u8(u8::from(d.gps.valid));
        if d.gps.valid {
            w.put_f64(d.gps.x);
            w.put_f64(d.gps.y);
            w.put_f64(d.gps.z);
        }

        if let Frame::Election(e) = self {
            w.put_u16(e.class_id);
            w.put_u32(e.direct_connections);
            w.put_u32(e.pdsf);
            w.put_f64(e.score);
            w.put_u32(e.hash);
            w.put_u16(e.pdsf_history.len() as u16);
            for unique in &e.pdsf_history {
                w.put_u32(*unique);
            }
        }

        debug_assert_eq!(w.pos, needed);
        Ok(needed)
    }

    /// Parse a frame from `bytes`.
    ///
    /// Fails with [`Error::MalformedFrame`] when the tag is unknown, a
    /// declared length exceeds 50, the buffer is shorter than the declared
    /// layout requires, or trailing bytes remain after the frame. The
    /// transport delimits frames, so a well-formed buffer is consumed
    /// exactly.
    pub fn parse(bytes: &[u8]) -> Result<Frame, Error> {
        let mut r = Reader::new(bytes);

        let tag = r.take_u8()?;
        let is_clusterhead = r.take_u8()? != 0;
        let sender_id = r.take_u32()?;
        let ttl = r.take_u8()?;

        let path_len = r.take_u16()? as usize;
        if path_len > MAX_PATH_HOPS {
            return Err(Error::MalformedFrame);
        }
        let mut path = HopPath::new();
        for _ in 0..path_len {
            // Capacity checked above, push cannot fail.
            let _ = path.push(r.take_u32()?);
        }

        let gps_available = r.take_u8()? != 0;
        let gps = if gps_available {
            GpsLocation::new(r.take_f64()?, r.take_f64()?, r.take_f64()?)
        } else {
            GpsLocation::invalid()
        };

        let discovery = DiscoveryFrame {
            is_clusterhead,
            sender_id,
            ttl,
            path,
            gps,
        };

        let frame = match tag {
            MESSAGE_TYPE_DISCOVERY => Frame::Discovery(discovery),
            MESSAGE_TYPE_ELECTION_ANNOUNCEMENT => {
                let class_id = r.take_u16()?;
                let direct_connections = r.take_u32()?;
                let pdsf = r.take_u32()?;
                let score = r.take_f64()?;
                let hash = r.take_u32()?;
                let history_len = r.take_u16()? as usize;
                if history_len > MAX_PATH_HOPS {
                    return Err(Error::MalformedFrame);
                }
                let mut pdsf_history = PdsfHistory::new();
                for _ in 0..history_len {
                    let _ = pdsf_history.push(r.take_u32()?);
                }
                Frame::Election(ElectionFrame {
                    discovery,
                    class_id,
                    direct_connections,
                    pdsf,
                    score,
                    hash,
                    pdsf_history,
                })
            }
            _ => return Err(Error::MalformedFrame),
        };

        if r.remaining() != 0 {
            return Err(Error::MalformedFrame);
        }
        Ok(frame)
    }
}

/// Big-endian writer over a caller-supplied buffer.
///
/// Length is checked once, up front, by `serialize`; the individual puts
/// index unconditionally.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_u8(&mut self, v: u8) {
        self.put_bytes(&[v]);
    }

    fn put_u16(&mut self, v: u16) {
        self.put_bytes(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_be_bytes());
    }

    fn put_f64(&mut self, v: f64) {
        self.put_bytes(&v.to_be_bytes());
    }
}

/// Big-endian reader that fails with `MalformedFrame` on underrun.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(Error::MalformedFrame);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_f64(&mut self) -> Result<f64, Error> {
        let b = self.take(8)?;
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
