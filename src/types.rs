use std::fmt;

pub type Lsn = i64;
pub type Psn = i64;
pub type TransactionId = i64;
pub type ReplicaId = i64;

pub const INVALID_LSN: Lsn = -1;
pub const ZERO_LSN: Lsn = 0;
pub const ONE_LSN: Lsn = 1;

pub const INVALID_PSN: Psn = -1;

pub const INVALID_REPLICA_ID: ReplicaId = -1;
pub const UNIVERSAL_REPLICA_ID: ReplicaId = 0;

/// Serialized byte offset meaning "not computed yet".
pub const UNKNOWN_RECORD_OFFSET: u64 = u64::MAX;
/// Serialized byte offset meaning "there is no referent".
pub const NO_RECORD_OFFSET: u64 = 0;

/// (data loss number, configuration number). Field order gives the total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch {
    pub data_loss_number: i64,
    pub configuration_number: i64,
}

impl Epoch {
    pub const INVALID: Epoch = Epoch::new(-1, -1);
    pub const ZERO: Epoch = Epoch::new(0, 0);

    pub const fn new(data_loss_number: i64, configuration_number: i64) -> Self {
        Self {
            data_loss_number,
            configuration_number,
        }
    }

    pub fn is_invalid(&self) -> bool {
        *self == Epoch::INVALID
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.data_loss_number, self.configuration_number)
    }
}

/// Status code carried by completion signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const CANCELLED: Status = Status(1);
    pub const INVALID_OPERATION: Status = Status(2);
    pub const IO_FAILURE: Status = Status(3);

    pub fn is_success(&self) -> bool {
        *self == Status::SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Status::SUCCESS => write!(f, "Success"),
            Status::CANCELLED => write!(f, "Cancelled"),
            Status::INVALID_OPERATION => write!(f, "InvalidOperation"),
            Status::IO_FAILURE => write!(f, "IoFailure"),
            Status(code) => write!(f, "Status({})", code),
        }
    }
}
