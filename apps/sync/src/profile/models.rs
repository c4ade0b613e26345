#![allow(dead_code)]

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A repeatable profile section, mapped to its REST collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Education,
    Experience,
    Certification,
}

impl Section {
    pub fn collection_path(&self) -> &'static str {
        match self {
            Section::Education => "profile/education",
            Section::Experience => "profile/experience",
            Section::Certification => "profile/certifications",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Section::Education => "education",
            Section::Experience => "experience",
            Section::Certification => "certifications",
        }
    }
}

/// Behavior every sub-record content kind provides to the reconciliation
/// engine. `PartialEq` is the field-by-field content compare that suppresses
/// no-op updates.
pub trait SectionContent:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const SECTION: Section;

    /// Entries failing this check never reach the network.
    fn is_blank(&self) -> bool;

    /// Content-based identity used to suppress duplicate creation when a
    /// matching record already exists remotely.
    fn natural_key(&self) -> String;

    /// A reason this entry cannot be saved yet, if any.
    fn save_blocker(&self) -> Option<String> {
        None
    }
}

fn key_of(a: &str, b: &str) -> String {
    format!("{}|{}", a.trim().to_lowercase(), b.trim().to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    pub school: String,
    pub degree: String,
    #[serde(default)]
    pub field_of_study: Option<String>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
}

impl SectionContent for Education {
    const SECTION: Section = Section::Education;

    fn is_blank(&self) -> bool {
        self.school.trim().is_empty() || self.degree.trim().is_empty()
    }

    fn natural_key(&self) -> String {
        key_of(&self.school, &self.degree)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub company: String,
    pub role: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl SectionContent for Experience {
    const SECTION: Section = Section::Experience;

    fn is_blank(&self) -> bool {
        self.company.trim().is_empty() || self.role.trim().is_empty()
    }

    fn natural_key(&self) -> String {
        key_of(&self.company, &self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certification {
    pub name: String,
    pub issuer: String,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    /// Wire format is `credentialUrl: string | null`; the mid-upload state
    /// exists only locally and is blocked from ever reaching the wire.
    #[serde(rename = "credentialUrl", default)]
    pub credential: Attachment,
}

impl SectionContent for Certification {
    const SECTION: Section = Section::Certification;

    fn is_blank(&self) -> bool {
        self.name.trim().is_empty() || self.issuer.trim().is_empty()
    }

    fn natural_key(&self) -> String {
        key_of(&self.name, &self.issuer)
    }

    fn save_blocker(&self) -> Option<String> {
        match self.credential {
            Attachment::Uploading => Some(format!(
                "Certificate file for '{}' is still uploading; please wait for the upload to finish",
                self.name
            )),
            _ => None,
        }
    }
}

/// Certificate document attachment lifecycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Attachment {
    #[default]
    None,
    /// Handed to the upload subsystem; no URL yet.
    Uploading,
    Uploaded {
        url: String,
    },
}

impl Serialize for Attachment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Attachment::Uploaded { url } => serializer.serialize_some(url),
            _ => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Attachment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let url = Option::<String>::deserialize(deserializer)?;
        Ok(match url {
            Some(url) if !url.trim().is_empty() => Attachment::Uploaded { url },
            _ => Attachment::None,
        })
    }
}

/// A sub-record as the form sees it. A `Draft` has never been persisted; a
/// `Persisted` entry carries the opaque server-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Entry<C> {
    Draft { local_id: Uuid, content: C },
    Persisted { local_id: Uuid, server_id: String, content: C },
}

impl<C: SectionContent> Entry<C> {
    pub fn draft(content: C) -> Self {
        Entry::Draft {
            local_id: Uuid::new_v4(),
            content,
        }
    }

    pub fn persisted(server_id: impl Into<String>, content: C) -> Self {
        Entry::Persisted {
            local_id: Uuid::new_v4(),
            server_id: server_id.into(),
            content,
        }
    }

    pub fn local_id(&self) -> Uuid {
        match self {
            Entry::Draft { local_id, .. } | Entry::Persisted { local_id, .. } => *local_id,
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            Entry::Draft { .. } => None,
            Entry::Persisted { server_id, .. } => Some(server_id),
        }
    }

    pub fn content(&self) -> &C {
        match self {
            Entry::Draft { content, .. } | Entry::Persisted { content, .. } => content,
        }
    }

    pub fn content_mut(&mut self) -> &mut C {
        match self {
            Entry::Draft { content, .. } | Entry::Persisted { content, .. } => content,
        }
    }
}

/// One sub-record as stored server-side. Content fields sit flat next to the
/// id on the wire: `{"id": "E1", "school": "MIT", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord<C> {
    pub id: String,
    #[serde(flatten)]
    pub content: C,
}

/// Top-level profile fields saved in a single call before the section lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCore {
    pub full_name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A local file to push through the Upload Subsystem before the save, keyed
/// to the certification it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub certification_name: String,
    pub file: std::path::PathBuf,
}

/// The locally persisted draft document: core fields plus the three
/// reconcilable section lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    pub core: ProfileCore,
    #[serde(default)]
    pub education: Vec<Entry<Education>>,
    #[serde(default)]
    pub experience: Vec<Entry<Experience>>,
    #[serde(default)]
    pub certifications: Vec<Entry<Certification>>,
    /// Certificate files not yet uploaded; drained by the runner before the
    /// save so no entry is still mid-upload when reconciliation starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRequest>,
}
