//! The search module builds the indexing pipeline on a search service: a data source, a skillset,
//! an index, and the indexer that ties them together.
//!
//! Each definition is rendered from a template and sent as a create-or-replace PUT to the
//! service's REST endpoint.  [`IndexPipeline`] only lets the indexer be created after the other
//! three exist, since its definition refers to them by name.

pub(crate) mod template;

use crate::shared::{printable_string, Secret};
use log::{debug, info};
use reqwest::Client;
use snafu::{ensure, ResultExt};
use template::{Substitutions, TemplateSet};

/// The artifacts a search indexing pipeline is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArtifactKind {
    DataSource,
    Skillset,
    Index,
    Indexer,
}

impl ArtifactKind {
    pub(crate) const ALL: [ArtifactKind; 4] = [
        ArtifactKind::DataSource,
        ArtifactKind::Skillset,
        ArtifactKind::Index,
        ArtifactKind::Indexer,
    ];

    /// The REST collection definitions of this kind live under
    pub(crate) fn collection(&self) -> &'static str {
        match self {
            ArtifactKind::DataSource => "datasources",
            ArtifactKind::Skillset => "skillsets",
            ArtifactKind::Index => "indexes",
            ArtifactKind::Indexer => "indexers",
        }
    }

    pub(crate) fn template_file(&self) -> &'static str {
        match self {
            ArtifactKind::DataSource => "datasource.json",
            ArtifactKind::Skillset => "skillset.json",
            ArtifactKind::Index => "index.json",
            ArtifactKind::Indexer => "indexer.json",
        }
    }
}

/// Talks to one search service's REST endpoint using its admin key
pub(crate) struct SearchClient {
    client: Client,
    endpoint: String,
    api_key: Secret,
    api_version: String,
}

impl SearchClient {
    pub(crate) fn new<S1, S2>(endpoint: S1, api_key: Secret, api_version: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            api_version: api_version.into(),
        }
    }

    /// Creates or replaces the definition `name` of the given kind.  Any non-2xx response fails.
    pub(crate) async fn put_artifact(
        &self,
        kind: ArtifactKind,
        name: &str,
        body: String,
    ) -> Result<()> {
        let uri = format!(
            "{}/{}/{}?api-version={}",
            self.endpoint,
            kind.collection(),
            name,
            self.api_version
        );
        debug!("Requesting PUT {}", uri);
        let response = self
            .client
            .put(&uri)
            .header("api-key", self.api_key.expose())
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .context(error::RequestSnafu { uri: &uri })?;
        let code = response.status();
        let response_body = response
            .bytes()
            .await
            .context(error::ResponseBodySnafu { uri: &uri, code })?;
        let response_str = printable_string(&response_body);
        ensure!(
            code.is_success(),
            error::ResponseSnafu {
                uri: &uri,
                code,
                response_body: response_str,
            }
        );
        debug!("Response: {}", response_str);
        Ok(())
    }
}

/// Names of the definitions on the search service
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArtifactNames {
    pub(crate) data_source: String,
    pub(crate) skillset: String,
    pub(crate) index: String,
    pub(crate) indexer: String,
}

impl ArtifactNames {
    fn get(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::DataSource => &self.data_source,
            ArtifactKind::Skillset => &self.skillset,
            ArtifactKind::Index => &self.index,
            ArtifactKind::Indexer => &self.indexer,
        }
    }
}

// Pipeline stages; each one is reachable only from the one before it.
pub(crate) struct Start;
pub(crate) struct DataSourceCreated;
pub(crate) struct SkillsetCreated;
pub(crate) struct IndexCreated;

/// Creates the four definitions in dependency order
pub(crate) struct IndexPipeline<'a, Stage> {
    client: &'a SearchClient,
    templates: &'a TemplateSet,
    substitutions: &'a Substitutions,
    names: &'a ArtifactNames,
    _stage: Stage,
}

impl<'a, Stage> IndexPipeline<'a, Stage> {
    async fn put(&self, kind: ArtifactKind) -> Result<()> {
        let name = self.names.get(kind);
        info!("Creating search {} '{}'...", kind.collection(), name);
        let body = template::render(
            kind.template_file(),
            self.templates.get(kind),
            self.substitutions,
        )?;
        self.client.put_artifact(kind, name, body).await
    }

    fn advance<Next>(self, next: Next) -> IndexPipeline<'a, Next> {
        IndexPipeline {
            client: self.client,
            templates: self.templates,
            substitutions: self.substitutions,
            names: self.names,
            _stage: next,
        }
    }
}

impl<'a> IndexPipeline<'a, Start> {
    pub(crate) fn new(
        client: &'a SearchClient,
        templates: &'a TemplateSet,
        substitutions: &'a Substitutions,
        names: &'a ArtifactNames,
    ) -> Self {
        Self {
            client,
            templates,
            substitutions,
            names,
            _stage: Start,
        }
    }

    pub(crate) async fn create_data_source(self) -> Result<IndexPipeline<'a, DataSourceCreated>> {
        self.put(ArtifactKind::DataSource).await?;
        Ok(self.advance(DataSourceCreated))
    }
}

impl<'a> IndexPipeline<'a, DataSourceCreated> {
    pub(crate) async fn create_skillset(self) -> Result<IndexPipeline<'a, SkillsetCreated>> {
        self.put(ArtifactKind::Skillset).await?;
        Ok(self.advance(SkillsetCreated))
    }
}

impl<'a> IndexPipeline<'a, SkillsetCreated> {
    pub(crate) async fn create_index(self) -> Result<IndexPipeline<'a, IndexCreated>> {
        self.put(ArtifactKind::Index).await?;
        Ok(self.advance(IndexCreated))
    }
}

impl<'a> IndexPipeline<'a, IndexCreated> {
    /// Creates the indexer, which starts indexing the data source, and returns the names of
    /// everything created.
    pub(crate) async fn create_indexer(self) -> Result<ArtifactNames> {
        self.put(ArtifactKind::Indexer).await?;
        Ok(self.names.clone())
    }
}

/// Runs the whole pipeline in order.  Each stage is a distinct type and `create_indexer` only
/// exists on `IndexPipeline<IndexCreated>`, so creating the indexer before its data source,
/// skillset and index doesn't compile.
pub(crate) async fn build_pipeline(
    client: &SearchClient,
    templates: &TemplateSet,
    substitutions: &Substitutions,
    names: &ArtifactNames,
) -> Result<ArtifactNames> {
    IndexPipeline::new(client, templates, substitutions, names)
        .create_data_source()
        .await?
        .create_skillset()
        .await?
        .create_index()
        .await?
        .create_indexer()
        .await
}

pub(crate) mod error {
    use http::StatusCode;
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(crate) enum Error {
        #[snafu(display("Failed to read template '{}': {}", path.display(), source))]
        TemplateRead {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("Template '{}' is empty", path.display()))]
        EmptyTemplate { path: PathBuf },

        #[snafu(display("Template '{}' still contains '{}' after rendering", template, token))]
        UnresolvedToken { template: String, token: String },

        #[snafu(display("Rendered template '{}' is not valid JSON: {}", template, source))]
        InvalidJson {
            template: String,
            source: serde_json::Error,
        },

        #[snafu(display("Error PUTing '{}': {}", uri, source))]
        Request { uri: String, source: reqwest::Error },

        #[snafu(display("Error {} when PUTing '{}': {}", code, uri, response_body))]
        Response {
            uri: String,
            code: StatusCode,
            response_body: String,
        },

        #[snafu(display(
            "Unable to read response body when PUTing '{}' (code {}) - {}",
            uri,
            code,
            source
        ))]
        ResponseBody {
            uri: String,
            code: StatusCode,
            source: reqwest::Error,
        },
    }
}
pub(crate) use error::Error;
pub(crate) type Result<T> = std::result::Result<T, error::Error>;
