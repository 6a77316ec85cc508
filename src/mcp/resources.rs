// src/mcp/resources.rs
// MCP Resource handlers: read-only access to cookie sessions and the
// technique library via the Resource protocol, alongside the Tool
// protocol defined in mod.rs.

use super::SentinelServer;
use rmcp::{
    model::{
        AnnotateAble, Annotated, ListResourceTemplatesResult, ListResourcesResult,
        PaginatedRequestParam, RawResource, RawResourceTemplate, ReadResourceRequestParam,
        ReadResourceResult, ResourceContents,
    },
    service::{RequestContext, RoleServer},
};

fn no_ann<T: AnnotateAble>(raw: T) -> Annotated<T> {
    Annotated::new(raw, None)
}

impl SentinelServer {
    fn resource_list() -> Vec<Annotated<RawResource>> {
        vec![
            no_ann(RawResource {
                uri: "cookie-session://list".into(),
                name: "cookie-sessions".into(),
                title: Some("Configured Cookie Sessions".into()),
                description: Some("Names of the cookie sessions available to http_request".into()),
                mime_type: Some("application/json".into()),
                size: None,
                icons: None,
                meta: None,
            }),
            no_ann(RawResource {
                uri: "technique-library://stats".into(),
                name: "technique-library-stats".into(),
                title: Some("Technique Library Stats".into()),
                description: Some("Entry counts by category".into()),
                mime_type: Some("application/json".into()),
                size: None,
                icons: None,
                meta: None,
            }),
        ]
    }

    fn resource_template_list() -> Vec<Annotated<RawResourceTemplate>> {
        vec![no_ann(RawResourceTemplate {
            uri_template: "cookie-session://{name}".into(),
            name: "cookie-session-detail".into(),
            title: Some("Cookie Session".into()),
            description: Some("Cached cookies for one configured session".into()),
            mime_type: Some("application/json".into()),
            icons: None,
        })]
    }

    pub(super) async fn handle_list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, rmcp::ErrorData> {
        Ok(ListResourcesResult {
            resources: Self::resource_list(),
            next_cursor: None,
            meta: None,
        })
    }

    pub(super) async fn handle_list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, rmcp::ErrorData> {
        Ok(ListResourceTemplatesResult {
            resource_templates: Self::resource_template_list(),
            next_cursor: None,
            meta: None,
        })
    }

    pub(super) async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, rmcp::ErrorData> {
        let uri = &request.uri;

        match uri.as_str() {
            "cookie-session://list" => self.read_cookie_session_list().await,
            "technique-library://stats" => self.read_technique_library_stats().await,
            _ if uri.starts_with("cookie-session://") => {
                let name = &uri["cookie-session://".len()..];
                self.read_cookie_session_detail(name).await
            }
            _ => Err(rmcp::ErrorData::invalid_params(
                format!("Unknown resource URI: {uri}"),
                None,
            )),
        }
    }

    async fn read_cookie_session_list(&self) -> Result<ReadResourceResult, rmcp::ErrorData> {
        let names: Vec<String> = match &self.cookies {
            Some(provider) => provider.list_sessions().await,
            None => Vec::new(),
        };
        let json = serde_json::to_string_pretty(&names).unwrap_or_else(|_| "[]".into());

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: "cookie-session://list".into(),
                mime_type: Some("application/json".into()),
                text: json,
                meta: None,
            }],
        })
    }

    async fn read_cookie_session_detail(&self, name: &str) -> Result<ReadResourceResult, rmcp::ErrorData> {
        let uri = format!("cookie-session://{name}");

        let Some(provider) = &self.cookies else {
            let response = crate::cookies::CookieSessionResponse::error(
                name,
                None,
                "no cookie sessions are configured",
            );
            let json = serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".into());
            return Ok(ReadResourceResult {
                contents: vec![ResourceContents::TextResourceContents {
                    uri,
                    mime_type: Some("application/json".into()),
                    text: json,
                    meta: None,
                }],
            });
        };

        // Errors (missing session, unreadable/insecure cookie file) are
        // surfaced as data in the response body, never as a transport error.
        let session = provider.read(name).await;
        let json = serde_json::to_string_pretty(&session).unwrap_or_else(|_| "{}".into());

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri,
                mime_type: Some("application/json".into()),
                text: json,
                meta: None,
            }],
        })
    }

    async fn read_technique_library_stats(&self) -> Result<ReadResourceResult, rmcp::ErrorData> {
        let stats = self.vector.library_stats().await.map_err(|e| {
            rmcp::ErrorData::internal_error(format!("Failed to read library stats: {e}"), None)
        })?;
        let json = serde_json::to_string_pretty(&stats).unwrap_or_else(|_| "{}".into());

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: "technique-library://stats".into(),
                mime_type: Some("application/json".into()),
                text: json,
                meta: None,
            }],
        })
    }
}
