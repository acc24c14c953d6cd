//! HTSP method names.

use std::fmt;

// RPC methods issued by the client.
pub const HELLO: &str = "hello";
pub const AUTHENTICATE: &str = "authenticate";
pub const ENABLE_ASYNC_METADATA: &str = "enableAsyncMetadata";
pub const DELETE_DVR_ENTRY: &str = "deleteDvrEntry";
pub const GET_DISK_SPACE: &str = "getDiskSpace";
pub const GET_SYS_TIME: &str = "getSysTime";

/// Methods the server pushes without a matching request.
///
/// A frame whose `method` field names one of these is never an answer to a
/// pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushMethod {
    ChannelAdd,
    ChannelUpdate,
    ChannelDelete,
    TagAdd,
    TagUpdate,
    TagDelete,
    DvrEntryAdd,
    DvrEntryUpdate,
    DvrEntryDelete,
    EventAdd,
    EventUpdate,
    EventDelete,
    InitialSyncCompleted,
    SubscriptionStart,
    SubscriptionStop,
    SubscriptionSkip,
    SubscriptionSpeed,
    SubscriptionStatus,
    QueueStatus,
    SignalStatus,
    TimeshiftStatus,
    MuxPkt,
}

impl PushMethod {
    pub const ALL: [PushMethod; 22] = [
        PushMethod::ChannelAdd,
        PushMethod::ChannelUpdate,
        PushMethod::ChannelDelete,
        PushMethod::TagAdd,
        PushMethod::TagUpdate,
        PushMethod::TagDelete,
        PushMethod::DvrEntryAdd,
        PushMethod::DvrEntryUpdate,
        PushMethod::DvrEntryDelete,
        PushMethod::EventAdd,
        PushMethod::EventUpdate,
        PushMethod::EventDelete,
        PushMethod::InitialSyncCompleted,
        PushMethod::SubscriptionStart,
        PushMethod::SubscriptionStop,
        PushMethod::SubscriptionSkip,
        PushMethod::SubscriptionSpeed,
        PushMethod::SubscriptionStatus,
        PushMethod::QueueStatus,
        PushMethod::SignalStatus,
        PushMethod::TimeshiftStatus,
        PushMethod::MuxPkt,
    ];

    /// Wire name of the method.
    pub fn name(self) -> &'static str {
        match self {
            PushMethod::ChannelAdd => "channelAdd",
            PushMethod::ChannelUpdate => "channelUpdate",
            PushMethod::ChannelDelete => "channelDelete",
            PushMethod::TagAdd => "tagAdd",
            PushMethod::TagUpdate => "tagUpdate",
            PushMethod::TagDelete => "tagDelete",
            PushMethod::DvrEntryAdd => "dvrEntryAdd",
            PushMethod::DvrEntryUpdate => "dvrEntryUpdate",
            PushMethod::DvrEntryDelete => "dvrEntryDelete",
            PushMethod::EventAdd => "eventAdd",
            PushMethod::EventUpdate => "eventUpdate",
            PushMethod::EventDelete => "eventDelete",
            PushMethod::InitialSyncCompleted => "initialSyncCompleted",
            PushMethod::SubscriptionStart => "subscriptionStart",
            PushMethod::SubscriptionStop => "subscriptionStop",
            PushMethod::SubscriptionSkip => "subscriptionSkip",
            PushMethod::SubscriptionSpeed => "subscriptionSpeed",
            PushMethod::SubscriptionStatus => "subscriptionStatus",
            PushMethod::QueueStatus => "queueStatus",
            PushMethod::SignalStatus => "signalStatus",
            PushMethod::TimeshiftStatus => "timeshiftStatus",
            PushMethod::MuxPkt => "muxpkt",
        }
    }

    /// Looks up a push method by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for PushMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_method_names_roundtrip() {
        for method in PushMethod::ALL {
            assert_eq!(PushMethod::from_name(method.name()), Some(method));
        }
    }

    #[test]
    fn test_rpc_names_are_not_push() {
        for name in [HELLO, AUTHENTICATE, ENABLE_ASYNC_METADATA, DELETE_DVR_ENTRY] {
            assert_eq!(PushMethod::from_name(name), None);
        }
    }

    #[test]
    fn test_push_method_lookup_is_case_sensitive() {
        assert_eq!(PushMethod::from_name("muxpkt"), Some(PushMethod::MuxPkt));
        assert_eq!(PushMethod::from_name("muxPkt"), None);
        assert_eq!(PushMethod::from_name("ChannelAdd"), None);
    }
}
