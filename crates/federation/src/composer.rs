//! Turns domain actions into addressed activities.
//!
//! Composition is pure: no I/O, no clock reads except where a note carries
//! no timestamp of its own.

use activitypub_federation::kinds::{object::NoteType, public};
use chrono::{DateTime, Utc};
use fedigraph_common::{AppError, AppResult};
use fedigraph_db::entities::{actor, follow, note, note::Visibility};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::activities::{
    ACTIVITYSTREAMS_CONTEXT, AcceptActivity, CreateActivity, DeleteActivity, FollowActivity,
    RejectActivity, UndoActivity, UpdateActivity,
};
use crate::objects::{ApNote, ApTag};
use crate::uris::LocalUris;

/// `to` and `cc` of an activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addressing {
    /// Primary audience.
    pub to: Vec<Url>,
    /// Secondary audience.
    pub cc: Vec<Url>,
}

impl Addressing {
    /// Addressing for a note, following its visibility.
    ///
    /// | visibility | to | cc |
    /// |---|---|---|
    /// | public | Public | followers |
    /// | unlisted | followers | Public |
    /// | followers | followers | |
    /// | direct | mentions | |
    #[must_use]
    pub fn for_visibility(visibility: Visibility, followers: Url, mentions: Vec<Url>) -> Self {
        match visibility {
            Visibility::Public => Self {
                to: vec![public()],
                cc: vec![followers],
            },
            Visibility::Unlisted => Self {
                to: vec![followers],
                cc: vec![public()],
            },
            Visibility::Followers => Self {
                to: vec![followers],
                cc: Vec::new(),
            },
            Visibility::Direct => Self {
                to: mentions,
                cc: Vec::new(),
            },
        }
    }

    /// Every addressed IRI, `to` first.
    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.to.iter().chain(self.cc.iter())
    }

    /// Whether the Public collection is addressed.
    #[must_use]
    pub fn is_public(&self) -> bool {
        let public = public();
        self.iter().any(|u| *u == public)
    }
}

/// An activity ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum OutboundActivity {
    Create(CreateActivity),
    Update(UpdateActivity),
    Delete(DeleteActivity),
    Follow(FollowActivity),
    Accept(AcceptActivity),
    Reject(RejectActivity),
    Undo(UndoActivity),
}

impl OutboundActivity {
    /// The activity type name.
    #[must_use]
    pub const fn activity_type(&self) -> &'static str {
        match self {
            Self::Create(_) => "Create",
            Self::Update(_) => "Update",
            Self::Delete(_) => "Delete",
            Self::Follow(_) => "Follow",
            Self::Accept(_) => "Accept",
            Self::Reject(_) => "Reject",
            Self::Undo(_) => "Undo",
        }
    }

    /// The activity IRI.
    #[must_use]
    pub const fn id(&self) -> &Url {
        match self {
            Self::Create(a) => &a.id,
            Self::Update(a) => &a.id,
            Self::Delete(a) => &a.id,
            Self::Follow(a) => &a.id,
            Self::Accept(a) => &a.id,
            Self::Reject(a) => &a.id,
            Self::Undo(a) => &a.id,
        }
    }

    /// The sending actor.
    #[must_use]
    pub const fn actor(&self) -> &Url {
        match self {
            Self::Create(a) => &a.actor,
            Self::Update(a) => &a.actor,
            Self::Delete(a) => &a.actor,
            Self::Follow(a) => &a.actor,
            Self::Accept(a) => &a.actor,
            Self::Reject(a) => &a.actor,
            Self::Undo(a) => &a.actor,
        }
    }

    /// IRI of the object this activity is about. Deliveries sharing an
    /// object id are kept in order per inbox.
    #[must_use]
    pub const fn object_id(&self) -> &Url {
        match self {
            Self::Create(a) => &a.object.id,
            Self::Update(a) => &a.object.id,
            Self::Delete(a) => &a.object,
            Self::Follow(a) => &a.id,
            Self::Accept(a) => a.object.id(),
            Self::Reject(a) => a.object.id(),
            Self::Undo(a) => a.object.id(),
        }
    }

    /// The activity's addressing.
    #[must_use]
    pub fn addressing(&self) -> Addressing {
        match self {
            Self::Create(a) => Addressing {
                to: a.to.clone(),
                cc: a.cc.clone(),
            },
            Self::Update(a) => Addressing {
                to: a.to.clone(),
                cc: a.cc.clone(),
            },
            Self::Delete(a) => Addressing {
                to: a.to.clone(),
                cc: a.cc.clone(),
            },
            Self::Follow(a) => Addressing {
                to: vec![a.object.clone()],
                cc: Vec::new(),
            },
            Self::Accept(a) => Addressing {
                to: a.to.clone(),
                cc: Vec::new(),
            },
            Self::Reject(a) => Addressing {
                to: a.to.clone(),
                cc: Vec::new(),
            },
            Self::Undo(a) => Addressing {
                to: a.to.clone(),
                cc: Vec::new(),
            },
        }
    }

    /// JSON-LD document with `@context`.
    pub fn to_json(&self) -> AppResult<Value> {
        let mut value =
            serde_json::to_value(self).map_err(|e| AppError::Internal(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "@context".to_string(),
                Value::String(ACTIVITYSTREAMS_CONTEXT.to_string()),
            );
        }
        Ok(value)
    }
}

/// Builds activities for local actors.
#[derive(Debug, Clone)]
pub struct ActivityComposer {
    uris: LocalUris,
}

impl ActivityComposer {
    /// Create a composer minting IRIs under `uris`.
    #[must_use]
    pub const fn new(uris: LocalUris) -> Self {
        Self { uris }
    }

    /// The IRI scheme in use.
    #[must_use]
    pub const fn uris(&self) -> &LocalUris {
        &self.uris
    }

    /// Compose a Create for a new note.
    pub fn compose_create(
        &self,
        note: &note::Model,
        author: &actor::Model,
    ) -> AppResult<OutboundActivity> {
        let object = self.note_object(note, author)?;
        let id = LocalUris::create_activity(&object.id);
        let actor = parse_iri(&author.iri)?;
        debug!(note_id = %note.id, activity = %id, "Composed Create");
        Ok(OutboundActivity::Create(CreateActivity::new(id, actor, object)))
    }

    /// Compose an Update for an edited note. The note's addressing is reused.
    pub fn compose_update(
        &self,
        note: &note::Model,
        author: &actor::Model,
    ) -> AppResult<OutboundActivity> {
        let object = self.note_object(note, author)?;
        let updated: DateTime<Utc> = note
            .updated_at
            .map_or_else(Utc::now, |at| at.with_timezone(&Utc));
        let id = LocalUris::update_activity(&object.id, updated.timestamp_millis());
        let actor = parse_iri(&author.iri)?;
        debug!(note_id = %note.id, activity = %id, "Composed Update");
        Ok(OutboundActivity::Update(UpdateActivity::new(
            id, actor, object, updated,
        )))
    }

    /// Compose a Delete. Only the note IRI is carried; addressing follows the
    /// note's visibility.
    pub fn compose_delete(
        &self,
        note: &note::Model,
        author: &actor::Model,
    ) -> AppResult<OutboundActivity> {
        let object = self.uris.note(&note.id);
        let actor = parse_iri(&author.iri)?;
        let addressing = self.addressing_for(note, &actor);
        let id = LocalUris::delete_activity(&object);
        debug!(note_id = %note.id, activity = %id, "Composed Delete");
        Ok(OutboundActivity::Delete(DeleteActivity::new(
            id,
            actor,
            object,
            addressing.to,
            addressing.cc,
        )))
    }

    /// The Follow `follower` sends to `target` for `edge`.
    ///
    /// For a remote follower this reconstructs the request when only the
    /// edge is known, e.g. when a locked account approves it later.
    pub fn compose_follow(
        &self,
        follower: &actor::Model,
        target: &actor::Model,
        edge: &follow::Model,
    ) -> AppResult<FollowActivity> {
        let actor = parse_iri(&follower.iri)?;
        let object = parse_iri(&target.iri)?;
        let id = LocalUris::follow_activity(&actor, &target.id, &edge.id);
        Ok(FollowActivity::new(id, actor, object))
    }

    /// Compose an Accept of `follow` by the local `target`.
    pub fn compose_accept(
        &self,
        target: &actor::Model,
        edge: &follow::Model,
        follow: FollowActivity,
    ) -> AppResult<OutboundActivity> {
        let actor = parse_iri(&target.iri)?;
        let id = LocalUris::accept_activity(&actor, &edge.id);
        let to = vec![follow.actor.clone()];
        Ok(OutboundActivity::Accept(
            AcceptActivity::new(id, actor, follow).to(to),
        ))
    }

    /// Compose a Reject of `follow` by the local `target`.
    pub fn compose_reject(
        &self,
        target: &actor::Model,
        edge: &follow::Model,
        follow: FollowActivity,
    ) -> AppResult<OutboundActivity> {
        let actor = parse_iri(&target.iri)?;
        let id = LocalUris::reject_activity(&actor, &edge.id);
        let to = vec![follow.actor.clone()];
        Ok(OutboundActivity::Reject(
            RejectActivity::new(id, actor, follow).to(to),
        ))
    }

    /// Compose an Undo of a Follow previously sent by the local `follower`.
    pub fn compose_undo_follow(
        &self,
        follower: &actor::Model,
        target: &actor::Model,
        edge: &follow::Model,
    ) -> AppResult<OutboundActivity> {
        let follow = self.compose_follow(follower, target, edge)?;
        let id = LocalUris::undo_activity(&follow.id);
        let to = vec![follow.object.clone()];
        Ok(OutboundActivity::Undo(
            UndoActivity::new(id, follow.actor.clone(), follow).to(to),
        ))
    }

    /// Note projection embedded in Create and Update.
    pub fn note_object(&self, note: &note::Model, author: &actor::Model) -> AppResult<ApNote> {
        let attributed_to = parse_iri(&author.iri)?;
        let addressing = self.addressing_for(note, &attributed_to);
        let tag = note
            .mention_list()
            .iter()
            .filter_map(|m| Url::parse(&m.iri).ok())
            .map(ApTag::mention)
            .collect();

        Ok(ApNote {
            kind: NoteType::Note,
            id: self.uris.note(&note.id),
            attributed_to,
            content: note.content.clone(),
            published: note.created_at.with_timezone(&Utc),
            updated: note.updated_at.map(|at| at.with_timezone(&Utc)),
            to: addressing.to,
            cc: addressing.cc,
            summary: note.summary.clone(),
            sensitive: note.sensitive,
            tag,
        })
    }

    fn addressing_for(&self, note: &note::Model, author: &Url) -> Addressing {
        let mentions = note
            .mention_list()
            .iter()
            .filter_map(|m| Url::parse(&m.iri).ok())
            .collect();
        Addressing::for_visibility(
            note.effective_visibility(),
            LocalUris::followers(author),
            mentions,
        )
    }
}

fn parse_iri(iri: &str) -> AppResult<Url> {
    Url::parse(iri).map_err(|e| AppError::Validation(format!("invalid IRI {iri}: {e}")))
}
