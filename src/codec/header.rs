use super::error::{CodecError, Result};
use crate::serialize::MAX_SERIALIZATION_ID;
use bitflags::bitflags;

const FLAG_REQUEST: u8 = 0x80;
const FLAG_TWO_WAY: u8 = 0x40;
const FLAG_EVENT: u8 = 0x20;
const SERIALIZATION_MASK: u8 = 0x1f;

bitflags! {
    /// Package category bits as the layer above sets them.
    #[derive(Default)]
    pub struct PackageType: u8 {
        const REQUEST = 0x02;
        const RESPONSE = 0x04;
        const HEARTBEAT = 0x08;
        const REQUEST_TWO_WAY = 0x10;
        const RESPONSE_EXCEPTION = 0x20;
    }
}

/// The logical category of a package, derived once from its type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Request,
    RequestOneWay,
    Response,
    HeartbeatRequest,
    HeartbeatResponse,
}

impl PacketKind {
    /// Type bits a decoder reports for this kind.
    pub fn package_type(self) -> PackageType {
        match self {
            PacketKind::Request => PackageType::REQUEST | PackageType::REQUEST_TWO_WAY,
            PacketKind::RequestOneWay => PackageType::REQUEST,
            PacketKind::Response => PackageType::RESPONSE,
            PacketKind::HeartbeatRequest => {
                PackageType::HEARTBEAT | PackageType::REQUEST | PackageType::REQUEST_TWO_WAY
            }
            PacketKind::HeartbeatResponse => PackageType::HEARTBEAT | PackageType::RESPONSE,
        }
    }

    pub fn is_request(self) -> bool {
        matches!(
            self,
            PacketKind::Request | PacketKind::RequestOneWay | PacketKind::HeartbeatRequest
        )
    }

    pub fn is_heartbeat(self) -> bool {
        matches!(self, PacketKind::HeartbeatRequest | PacketKind::HeartbeatResponse)
    }
}

/// Response status byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseStatus {
    Ok = 20,
    ClientTimeout = 30,
    ServerTimeout = 31,
    BadRequest = 40,
    BadResponse = 50,
    ServiceNotFound = 60,
    ServiceError = 70,
    ServerError = 80,
    ClientError = 90,
    ServerThreadpoolExhausted = 100,
}

impl ResponseStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            20 => Some(ResponseStatus::Ok),
            30 => Some(ResponseStatus::ClientTimeout),
            31 => Some(ResponseStatus::ServerTimeout),
            40 => Some(ResponseStatus::BadRequest),
            50 => Some(ResponseStatus::BadResponse),
            60 => Some(ResponseStatus::ServiceNotFound),
            70 => Some(ResponseStatus::ServiceError),
            80 => Some(ResponseStatus::ServerError),
            90 => Some(ResponseStatus::ClientError),
            100 => Some(ResponseStatus::ServerThreadpoolExhausted),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// [magic (16)][flags (8)][status (8)][request id (64)][body length (32)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub package_type: PackageType,
    pub serial_id: u8,
    /// Meaningful for responses only.
    pub status: u8,
    pub id: i64,
    pub body_len: u32,
}

impl Header {
    pub const HEADER_LENGTH: usize = 16;
    pub const MAGIC: [u8; 2] = [0xda, 0xbb];

    pub fn new(package_type: PackageType, serial_id: u8, id: i64) -> Self {
        Header {
            package_type,
            serial_id,
            status: 0,
            id,
            body_len: 0,
        }
    }

    /// `None` when the type bits are empty or contradictory.
    pub fn kind(&self) -> Option<PacketKind> {
        let t = self.package_type;
        if t.contains(PackageType::REQUEST) && t.contains(PackageType::RESPONSE) {
            return None;
        }
        if t.contains(PackageType::HEARTBEAT) {
            return Some(if t.contains(PackageType::RESPONSE) {
                PacketKind::HeartbeatResponse
            } else {
                PacketKind::HeartbeatRequest
            });
        }
        if t.contains(PackageType::REQUEST) {
            Some(if t.contains(PackageType::REQUEST_TWO_WAY) {
                PacketKind::Request
            } else {
                PacketKind::RequestOneWay
            })
        } else if t.contains(PackageType::RESPONSE) {
            Some(PacketKind::Response)
        } else {
            None
        }
    }

    pub fn response_status(&self) -> Option<ResponseStatus> {
        ResponseStatus::from_u8(self.status)
    }

    pub fn encode(&self) -> Result<[u8; 16]> {
        let kind = self.kind().ok_or_else(|| {
            CodecError::InvalidPackage(format!(
                "package type {:?} names no packet kind",
                self.package_type
            ))
        })?;
        if self.serial_id > MAX_SERIALIZATION_ID {
            return Err(CodecError::InvalidPackage(format!(
                "serialization id {} does not fit in five bits",
                self.serial_id
            )));
        }

        let (flags, status) = match kind {
            PacketKind::Request => (FLAG_REQUEST | FLAG_TWO_WAY, 0),
            PacketKind::RequestOneWay => (FLAG_REQUEST, 0),
            PacketKind::HeartbeatRequest => (FLAG_REQUEST | FLAG_TWO_WAY | FLAG_EVENT, 0),
            PacketKind::Response => (0, self.status),
            PacketKind::HeartbeatResponse => (FLAG_EVENT, self.status),
        };

        let mut buffer = [0u8; 16];
        buffer[0..2].copy_from_slice(&Self::MAGIC);
        buffer[2] = flags | self.serial_id;
        buffer[3] = status;
        buffer[4..12].copy_from_slice(&self.id.to_be_bytes());
        buffer[12..16].copy_from_slice(&self.body_len.to_be_bytes());
        Ok(buffer)
    }

    /// Parses the header at the start of `buffer`.
    ///
    /// Returns `Ok(None)` while fewer than [`Header::HEADER_LENGTH`] bytes are available.
    pub fn decode(buffer: &[u8]) -> Result<Option<Self>> {
        if buffer.len() < Self::HEADER_LENGTH {
            return Ok(None);
        }
        if buffer[0..2] != Self::MAGIC {
            return Err(CodecError::BadMagic(buffer[0], buffer[1]));
        }

        let flags = buffer[2];
        let status = buffer[3];
        let package_type = if flags & FLAG_REQUEST != 0 {
            let mut t = PackageType::REQUEST;
            // heartbeat requests always expect a reply, whatever the two-way bit says
            if flags & FLAG_EVENT != 0 {
                t |= PackageType::HEARTBEAT | PackageType::REQUEST_TWO_WAY;
            } else if flags & FLAG_TWO_WAY != 0 {
                t |= PackageType::REQUEST_TWO_WAY;
            }
            t
        } else {
            let mut t = PackageType::RESPONSE;
            if flags & FLAG_EVENT != 0 {
                t |= PackageType::HEARTBEAT;
            }
            if status != ResponseStatus::Ok.as_u8() {
                t |= PackageType::RESPONSE_EXCEPTION;
            }
            t
        };

        Ok(Some(Header {
            package_type,
            serial_id: flags & SERIALIZATION_MASK,
            status,
            id: i64::from_be_bytes(be_array(&buffer[4..12])),
            body_len: u32::from_be_bytes(be_array(&buffer[12..16])),
        }))
    }
}

fn be_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
