//! Rop dispatch.
//!
//! Each request walks `Start → HandleResolved → KindDispatched →
//! PropertiesEncoded → ReplyReady`. Sanity failures leave early with an
//! error; per-property failures are encoded inline and never fail the reply.

use std::sync::Arc;

use emsmdb_core::{EntryIdBuilder, MapiStatus, PropertyTag, PropertyType, PropertyValue, tags};
use emsmdb_protocol::{
    GetPropertiesReply, GetPropertiesRequest, PropertyBlob, ProtocolError, RopReply, RopReplyBody,
    RopRequest, RopRequestBody, encode_property, requires_layout,
};
use tracing::{debug, trace};

use crate::error::{ServerError, ServerResult};
use crate::handles::{Handle, HandleEntry};
use crate::object::{FolderObject, MailboxObject, MessageObject, ObjectArena, ServerObject};
use crate::session::Session;
use crate::store::PropertyStore;

/// Progress of one request through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Start,
    HandleResolved,
    KindDispatched,
    PropertiesEncoded,
    ReplyReady,
}

fn enter(stage: DispatchStage) {
    trace!(?stage, "Dispatch stage");
}

/// Outcome of one dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    /// The reply, or `None` for Rops that produce no reply.
    pub reply: Option<RopReply>,
    /// Encoded size of the reply.
    pub size: usize,
}

impl Dispatched {
    fn reply(reply: RopReply) -> Self {
        let size = reply.wire_size();
        Self {
            reply: Some(reply),
            size,
        }
    }

    fn none() -> Self {
        Self {
            reply: None,
            size: 0,
        }
    }
}

/// Routes Rop requests to kind-specific handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RopDispatcher;

impl RopDispatcher {
    /// Creates a dispatcher.
    pub fn new() -> Self {
        Self
    }

    /// Dispatches one request against `ctx`.
    ///
    /// `handles` is the handle array that came with the request batch; the
    /// request's `handle_idx` indexes into it.
    #[tracing::instrument(
        skip_all,
        fields(rop = ?request.rop_id, handle_idx = request.handle_idx)
    )]
    pub fn dispatch(
        &self,
        ctx: Option<&mut Session>,
        request: &RopRequest,
        handles: &[Handle],
    ) -> ServerResult<Dispatched> {
        enter(DispatchStage::Start);
        let session = ctx.ok_or(ServerError::NotInitialized)?;
        request.check_body()?;

        if handles.is_empty() {
            return Err(ServerError::invalid_parameter("empty handle array"));
        }
        let handle = *handles.get(request.handle_idx as usize).ok_or_else(|| {
            ServerError::invalid_parameter(format!(
                "handle index {} outside handle array of {}",
                request.handle_idx,
                handles.len()
            ))
        })?;
        let kind = session.handles().resolve(handle)?.kind;
        enter(DispatchStage::HandleResolved);
        debug!(handle, kind = %kind, "Resolved handle");

        match &request.body {
            RopRequestBody::Release => {
                session.release(handle)?;
                enter(DispatchStage::ReplyReady);
                Ok(Dispatched::none())
            }
            RopRequestBody::GetPropertiesSpecific(body) => {
                let reply = get_properties_specific(session, handle, request, body)?;
                enter(DispatchStage::ReplyReady);
                Ok(Dispatched::reply(reply))
            }
        }
    }

    /// Dispatches one request, turning a fatal error into an error-only
    /// reply carrying the same rop id and handle index.
    pub fn dispatch_or_error(
        &self,
        ctx: Option<&mut Session>,
        request: &RopRequest,
        handles: &[Handle],
    ) -> Dispatched {
        match self.dispatch(ctx, request, handles) {
            Ok(dispatched) => dispatched,
            Err(e) => {
                debug!(error = %e, status = %e.status(), "Rop failed");
                Dispatched::reply(RopReply::error(request.rop_id, request.handle_idx, e.status()))
            }
        }
    }

    /// Decodes a buffer of requests, dispatches each in order and returns
    /// the concatenated replies.
    pub fn process_buffer(
        &self,
        session: &mut Session,
        requests: &[u8],
        handles: &[Handle],
    ) -> ServerResult<Vec<u8>> {
        let requests = RopRequest::decode_batch(requests)?;
        let mut out = Vec::new();
        for request in &requests {
            let dispatched = self.dispatch_or_error(Some(&mut *session), request, handles);
            if let Some(reply) = dispatched.reply {
                out.extend(reply.encode()?);
            }
        }
        Ok(out)
    }
}

fn get_properties_specific(
    session: &mut Session,
    handle: Handle,
    request: &RopRequest,
    body: &GetPropertiesRequest,
) -> ServerResult<RopReply> {
    let max_blob_size = session.config().max_blob_size;
    let layout = requires_layout(&body.tags);
    debug!(
        count = body.tags.len(),
        layout,
        want_unicode = body.wants_unicode(),
        "GetPropertiesSpecific"
    );

    let entry_ids = Arc::clone(session.entry_ids());
    let store = Arc::clone(session.store());
    let entry = session.handles_mut().resolve_mut(handle)?;
    enter(DispatchStage::KindDispatched);

    let values: Vec<PropertyValue> = match entry {
        HandleEntry {
            object: ServerObject::Mailbox(mailbox),
            arena,
            ..
        } => body
            .tags
            .iter()
            .map(|tag| mailbox_property(mailbox, arena, entry_ids.as_ref(), *tag))
            .collect(),
        HandleEntry {
            object: ServerObject::Folder(folder),
            ..
        } => body
            .tags
            .iter()
            .map(|tag| folder_property(folder, *tag))
            .collect(),
        HandleEntry {
            object: ServerObject::Message(message),
            ..
        } => body
            .tags
            .iter()
            .map(|tag| message_property(message, *tag))
            .collect(),
        HandleEntry {
            object: ServerObject::Unresolved(object),
            ..
        } => {
            let mut values = store.get_properties(object, &body.tags)?;
            values.resize(body.tags.len(), PropertyValue::Absent);
            values
        }
    };

    let reply = encode_reply(request, &body.tags, values, layout, max_blob_size)?;
    enter(DispatchStage::PropertiesEncoded);
    Ok(reply)
}

fn encode_reply(
    request: &RopRequest,
    requested: &[PropertyTag],
    values: Vec<PropertyValue>,
    layout: bool,
    max_blob_size: usize,
) -> ServerResult<RopReply> {
    let mut blob = PropertyBlob::new(layout);
    let entries: Vec<_> = requested
        .iter()
        .zip(values.iter())
        .map(|(tag, value)| encode_property(*tag, value, &mut blob))
        .collect();

    if blob.len() > max_blob_size {
        return Err(ProtocolError::BlobTooLarge {
            size: blob.len(),
            max: max_blob_size,
        }
        .into());
    }
    debug!(
        size = blob.len(),
        errors = blob.error_count(),
        "Encoded property blob"
    );

    Ok(RopReply::success(
        request.rop_id,
        request.handle_idx,
        RopReplyBody::GetPropertiesSpecific(GetPropertiesReply::from_blob(blob, entries)),
    ))
}

fn mailbox_property(
    mailbox: &MailboxObject,
    arena: &mut ObjectArena,
    entry_ids: &dyn EntryIdBuilder,
    tag: PropertyTag,
) -> PropertyValue {
    match tag {
        t if tags::is_layout_sensitive(t) => PropertyValue::Error(MapiStatus::NoAccess),
        tags::PR_USER_ENTRYID => PropertyValue::Binary(
            arena
                .get_or_insert_with(&mailbox.user_dn, || {
                    entry_ids.build_entry_id(&mailbox.user_dn)
                })
                .to_vec(),
        ),
        tags::PR_MAILBOX_OWNER_ENTRYID => PropertyValue::Binary(
            arena
                .get_or_insert_with(&mailbox.owner_essdn, || {
                    entry_ids.build_entry_id(&mailbox.owner_essdn)
                })
                .to_vec(),
        ),
        tags::PR_MAILBOX_OWNER_NAME => PropertyValue::NarrowString(mailbox.owner_name.clone()),
        tags::PR_MAILBOX_OWNER_NAME_UNICODE => {
            PropertyValue::WideString(mailbox.owner_name.clone())
        }
        _ => PropertyValue::Error(MapiStatus::NotFound),
    }
}

fn folder_property(folder: &FolderObject, tag: PropertyTag) -> PropertyValue {
    match tag {
        tags::PR_FID => PropertyValue::Identifier64(folder.folder_id),
        tags::PR_FOLDER_TYPE => PropertyValue::Integer(folder.folder_type()),
        _ => stored_property(&folder.properties, tag),
    }
}

fn message_property(message: &MessageObject, tag: PropertyTag) -> PropertyValue {
    match tag {
        tags::PR_MID => PropertyValue::Identifier64(message.message_id),
        tags::PR_PARENT_FID => PropertyValue::Identifier64(message.folder_id),
        tags::PR_ACCESS_LEVEL => PropertyValue::Integer(message.access_level()),
        _ => stored_property(&message.properties, tag),
    }
}

/// Reads a stored value, falling back to the other string width for text
/// tags.
fn stored_property(properties: &PropertyStore, tag: PropertyTag) -> PropertyValue {
    if let Some(value) = properties.get_ref(tag) {
        return value.clone();
    }
    let Ok(ty) = tag.prop_type() else {
        return PropertyValue::Absent;
    };
    let other = match ty {
        PropertyType::NarrowString => PropertyType::WideString,
        PropertyType::WideString => PropertyType::NarrowString,
        _ => return PropertyValue::Absent,
    };
    properties.get(tag.with_type(other)).with_string_width(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::memory::MemoryStore;
    use crate::object::{ObjectKind, OpenMode};
    use crate::session::MailboxIdentity;
    use crate::store::ObjectRef;
    use emsmdb_core::{AddressBookEntryIds, FileTime};
    use emsmdb_protocol::{PropertyEntry, RopId};

    const MAILBOX: u64 = 0x1_0001;
    const ROOT: u64 = 0x1_0002;
    const INBOX: u64 = 0x5_0001;
    const MESSAGE: u64 = 0x9_0001;
    const OWNER_DN: &str = "/o=First Organization/ou=Exchange/cn=Recipients/cn=jane";

    fn narrow(text: &str) -> PropertyValue {
        PropertyValue::NarrowString(text.into())
    }

    fn wide(text: &str) -> PropertyValue {
        PropertyValue::WideString(text.into())
    }

    fn session() -> Session {
        let store = MemoryStore::new()
            .with_object(
                ObjectRef::new(ObjectKind::Mailbox, MAILBOX),
                vec![(tags::PR_DISPLAY_NAME, narrow("Jane's box"))],
            )
            .with_object(ObjectRef::new(ObjectKind::SystemFolder(1), ROOT), vec![])
            .with_object(
                ObjectRef::new(ObjectKind::GenericFolder, INBOX),
                vec![
                    (tags::PR_DISPLAY_NAME, narrow("Inbox")),
                    (tags::PR_CONTENT_COUNT, PropertyValue::Integer(3)),
                ],
            )
            .with_object(
                ObjectRef::new(ObjectKind::Message, MESSAGE),
                vec![
                    (tags::PR_SUBJECT_UNICODE, wide("Lunch")),
                    (tags::PR_MESSAGE_FLAGS, narrow("bad")),
                    (
                        tags::PR_MESSAGE_DELIVERY_TIME,
                        PropertyValue::Timestamp(FileTime::from_ticks(1)),
                    ),
                ],
            );
        Session::new(
            Arc::new(store),
            Arc::new(AddressBookEntryIds),
            ServerConfig::default(),
        )
        .unwrap()
    }

    fn open_mailbox(session: &mut Session) -> Handle {
        session
            .open_mailbox(MailboxIdentity::owned_by(MAILBOX, "Jane Doe", OWNER_DN))
            .unwrap()
    }

    fn get(tags: Vec<PropertyTag>) -> RopRequest {
        RopRequest::get_properties(0, 0, GetPropertiesRequest::new(tags))
    }

    fn entries(dispatched: &Dispatched) -> &[PropertyEntry] {
        let reply = dispatched.reply.as_ref().unwrap();
        &reply.properties().unwrap().entries
    }

    fn outcomes(dispatched: &Dispatched) -> Vec<Result<PropertyValue, MapiStatus>> {
        entries(dispatched)
            .iter()
            .map(|e| e.outcome.clone())
            .collect()
    }

    #[test]
    fn mailbox_scenario() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let request = get(vec![
            tags::PR_MAILBOX_OWNER_NAME_UNICODE,
            tags::PR_MAPPING_SIGNATURE,
            PropertyTag(0x0000_0000),
        ]);

        let dispatched = RopDispatcher::new()
            .dispatch(Some(&mut session), &request, &[mailbox])
            .unwrap();
        let reply = dispatched.reply.as_ref().unwrap();
        assert_eq!(reply.error_code, MapiStatus::Success);
        assert_eq!(reply.rop_id, RopId::GetPropertiesSpecific);
        assert_eq!(reply.handle_idx, 0);

        let props = reply.properties().unwrap();
        assert!(props.layout);
        assert_eq!(
            props.entries,
            vec![
                PropertyEntry {
                    tag: tags::PR_MAILBOX_OWNER_NAME_UNICODE,
                    outcome: Ok(PropertyValue::WideString("Jane Doe".into())),
                },
                PropertyEntry {
                    tag: PropertyTag(0x0FF8_000A),
                    outcome: Err(MapiStatus::NoAccess),
                },
                PropertyEntry {
                    tag: PropertyTag(0x0000_000A),
                    outcome: Err(MapiStatus::NotFound),
                },
            ]
        );
        assert_eq!(dispatched.size, 6 + 1 + 2 + props.prop_data.len());

        let decoded = props.decode_entries(&props.reply_tags()).unwrap();
        assert_eq!(decoded, props.entries);
    }

    #[test]
    fn mailbox_scenario_wire_bytes() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let request = get(vec![
            tags::PR_MAILBOX_OWNER_NAME_UNICODE,
            tags::PR_MAPPING_SIGNATURE,
            PropertyTag(0x0000_0000),
        ]);
        let dispatched = RopDispatcher::new()
            .dispatch(Some(&mut session), &request, &[mailbox])
            .unwrap();
        let bytes = dispatched.reply.unwrap().encode().unwrap();
        let hex = bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");

        insta::assert_snapshot!(
            hex,
            @"07 00 00 00 00 00 01 1f 00 00 12 00 4a 00 61 00 6e 00 65 00 20 00 44 00 6f 00 65 00 00 00 0a 05 00 07 80 0a 0f 01 04 80"
        );
        assert_eq!(bytes.len(), dispatched.size);
    }

    #[test]
    fn mailbox_entry_ids() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let request = get(vec![tags::PR_USER_ENTRYID, tags::PR_MAILBOX_OWNER_ENTRYID]);

        let dispatched = RopDispatcher::new()
            .dispatch(Some(&mut session), &request, &[mailbox])
            .unwrap();
        let expected = AddressBookEntryIds.build_entry_id(OWNER_DN);
        let props = dispatched.reply.as_ref().unwrap().properties().unwrap();
        assert!(!props.layout);
        for entry in &props.entries {
            assert_eq!(entry.outcome, Ok(PropertyValue::Binary(expected.clone())));
        }

        let arena = &session.handles().resolve(mailbox).unwrap().arena;
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn partial_failure_isolation() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let request = get(vec![
            tags::PR_IPM_PUBLIC_FOLDERS_ENTRYID,
            tags::PR_DISPLAY_NAME,
            tags::PR_MAILBOX_OWNER_NAME,
        ]);
        let dispatched = RopDispatcher::new()
            .dispatch(Some(&mut session), &request, &[mailbox])
            .unwrap();

        assert_eq!(
            outcomes(&dispatched),
            vec![
                Err(MapiStatus::NoAccess),
                Err(MapiStatus::NotFound),
                Ok(PropertyValue::NarrowString("Jane Doe".into())),
            ]
        );
        assert!(dispatched.reply.unwrap().is_success());
    }

    #[test]
    fn folder_properties() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let root = session.open_folder(mailbox, ROOT, 1).unwrap();
        let inbox = session.open_folder(root, INBOX, 0).unwrap();
        let dispatcher = RopDispatcher::new();

        let request = get(vec![
            tags::PR_FID,
            tags::PR_FOLDER_TYPE,
            tags::PR_DISPLAY_NAME_UNICODE,
            tags::PR_CONTENT_COUNT,
            tags::PR_SUBJECT,
        ]);
        let dispatched = dispatcher
            .dispatch(Some(&mut session), &request, &[root, inbox])
            .unwrap();
        assert_eq!(
            outcomes(&dispatched),
            vec![
                Ok(PropertyValue::Identifier64(ROOT)),
                Ok(PropertyValue::Integer(0)),
                Err(MapiStatus::NotFound),
                Err(MapiStatus::NotFound),
                Err(MapiStatus::NotFound),
            ]
        );

        let wanted = vec![
            tags::PR_FOLDER_TYPE,
            tags::PR_DISPLAY_NAME_UNICODE,
            tags::PR_CONTENT_COUNT,
        ];
        let request = RopRequest::get_properties(0, 1, GetPropertiesRequest::new(wanted));
        let dispatched = dispatcher
            .dispatch(Some(&mut session), &request, &[root, inbox])
            .unwrap();
        assert_eq!(
            outcomes(&dispatched),
            vec![
                Ok(PropertyValue::Integer(1)),
                Ok(wide("Inbox")),
                Ok(PropertyValue::Integer(3)),
            ]
        );
    }

    #[test]
    fn message_properties() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let inbox = session.open_folder(mailbox, INBOX, 0).unwrap();
        let message = session
            .open_message(inbox, MESSAGE, OpenMode::ReadWrite)
            .unwrap();

        let request = get(vec![
            tags::PR_MID,
            tags::PR_PARENT_FID,
            tags::PR_ACCESS_LEVEL,
            tags::PR_SUBJECT,
            tags::PR_MESSAGE_FLAGS,
            tags::PR_MESSAGE_DELIVERY_TIME,
        ]);
        let dispatched = RopDispatcher::new()
            .dispatch(Some(&mut session), &request, &[message])
            .unwrap();
        assert_eq!(
            outcomes(&dispatched),
            vec![
                Ok(PropertyValue::Identifier64(MESSAGE)),
                Ok(PropertyValue::Identifier64(INBOX)),
                Ok(PropertyValue::Integer(1)),
                Ok(PropertyValue::NarrowString("Lunch".into())),
                Err(MapiStatus::InvalidType),
                Ok(PropertyValue::Timestamp(FileTime::from_ticks(1))),
            ]
        );
        assert_eq!(entries(&dispatched)[4].tag, PropertyTag(0x0E07_000A));
    }

    #[test]
    fn unresolved_delegates_to_store() {
        let mut session = session();
        let handle = session
            .register_unresolved(ObjectRef::new(ObjectKind::Unresolved, INBOX), None)
            .unwrap();
        let request = get(vec![tags::PR_CONTENT_COUNT, tags::PR_FID]);
        let dispatched = RopDispatcher::new()
            .dispatch(Some(&mut session), &request, &[handle])
            .unwrap();
        assert_eq!(
            outcomes(&dispatched),
            vec![Ok(PropertyValue::Integer(3)), Err(MapiStatus::NotFound)]
        );
    }

    #[test]
    fn release_has_no_reply() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let dispatcher = RopDispatcher::new();

        let dispatched = dispatcher
            .dispatch(Some(&mut session), &RopRequest::release(0, 0), &[mailbox])
            .unwrap();
        assert!(dispatched.reply.is_none());
        assert_eq!(dispatched.size, 0);

        let err = dispatcher
            .dispatch(Some(&mut session), &get(vec![tags::PR_FID]), &[mailbox])
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownHandle(h) if h == mailbox));
    }

    #[test]
    fn fatal_errors() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let dispatcher = RopDispatcher::new();
        let request = get(vec![tags::PR_FID]);

        assert!(matches!(
            dispatcher.dispatch(None, &request, &[mailbox]),
            Err(ServerError::NotInitialized)
        ));
        assert!(matches!(
            dispatcher.dispatch(Some(&mut session), &request, &[]),
            Err(ServerError::InvalidParameter { .. })
        ));
        let out_of_range = RopRequest::get_properties(0, 3, GetPropertiesRequest::new(vec![]));
        assert!(matches!(
            dispatcher.dispatch(Some(&mut session), &out_of_range, &[mailbox]),
            Err(ServerError::InvalidParameter { .. })
        ));
        let mismatched = RopRequest {
            body: RopRequestBody::Release,
            ..request.clone()
        };
        assert_eq!(
            dispatcher
                .dispatch(Some(&mut session), &mismatched, &[mailbox])
                .unwrap_err()
                .status(),
            MapiStatus::InvalidParameter
        );
    }

    #[test]
    fn error_reply_has_no_property_data() {
        let mut session = session();
        let dispatcher = RopDispatcher::new();
        let request = get(vec![tags::PR_FID]);
        let dispatched = dispatcher.dispatch_or_error(Some(&mut session), &request, &[77]);
        assert_eq!(dispatched.size, 6);
        let reply = dispatched.reply.unwrap();
        assert_eq!(reply.error_code, MapiStatus::UnknownHandle);
        assert_eq!(reply.handle_idx, 0);
        assert!(reply.properties().is_none());

        let dispatched = dispatcher.dispatch_or_error(None, &request, &[77]);
        assert_eq!(
            dispatched.reply.unwrap().error_code,
            MapiStatus::NotInitialized
        );
    }

    #[test]
    fn blob_limit_is_fatal() {
        let store = MemoryStore::new().with_object(
            ObjectRef::new(ObjectKind::GenericFolder, INBOX),
            vec![(tags::PR_DISPLAY_NAME, narrow(&"x".repeat(64)))],
        );
        let mut session = Session::new(
            Arc::new(store),
            Arc::new(AddressBookEntryIds),
            ServerConfig::default().with_max_blob_size(32),
        )
        .unwrap();
        let handle = session
            .register_unresolved(ObjectRef::new(ObjectKind::Unresolved, INBOX), None)
            .unwrap();
        let request = get(vec![tags::PR_DISPLAY_NAME]);
        let err = RopDispatcher::new()
            .dispatch(Some(&mut session), &request, &[handle])
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Protocol(ProtocolError::BlobTooLarge { max: 32, .. })
        ));
        assert_eq!(err.status(), MapiStatus::NotEnoughResources);
    }

    #[test]
    fn process_buffer_runs_batch() {
        let mut session = session();
        let mailbox = open_mailbox(&mut session);
        let mut requests = get(vec![tags::PR_MAILBOX_OWNER_NAME]).encode().unwrap();
        requests.extend(RopRequest::release(0, 0).encode().unwrap());
        requests.extend(get(vec![tags::PR_MAILBOX_OWNER_NAME]).encode().unwrap());

        let out = RopDispatcher::new()
            .process_buffer(&mut session, &requests, &[mailbox])
            .unwrap();

        let first_len = 6 + 1 + 2 + 2 + "Jane Doe".len() + 1;
        let first = RopReply::decode(&out[..first_len]).unwrap();
        assert!(first.is_success());
        let second = RopReply::decode(&out[first_len..]).unwrap();
        assert_eq!(second.error_code, MapiStatus::UnknownHandle);
        assert!(session.handles().is_empty());
    }
}
