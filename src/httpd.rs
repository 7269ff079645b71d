//! The REST facade which publishes the registry over HTTP.
//!
//! All endpoints are read-only (GET; anything else yields a 405 with an **Allow** header) and
//! emit JSON, except for the photo endpoint which delivers raw JPEG bytes:
//!
//! * `/` - an overview document linking to every group and person,
//! * `/groups` and `/groups/{id}` - the group listing and full group documents,
//! * `/people` and `/people/{id}` - the people listing and full person documents,
//! * `/people/{id}/photo` - the portrait of a person.
//!
//! Errors are rendered as `{status, reason, description}` objects: unknown entities and
//! missing photos map to 404, an unreachable directory (without stale data to fall back to)
//! maps to 503. The server shuts down gracefully once the platform is terminated.
use crate::hypermedia::Link;
use crate::model::{Group, Person};
use crate::platform::Platform;
use crate::registry::store::Cached;
use crate::registry::{Registry, RegistryError};
use chrono::SecondsFormat;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Runs the HTTP server on the given address until the platform is terminated.
pub async fn serve(
    platform: Arc<Platform>,
    registry: Arc<Registry>,
    address: SocketAddr,
) -> anyhow::Result<()> {
    let make_service = make_service_fn(move |_connection| {
        let registry = registry.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                let registry = registry.clone();
                async move { Ok::<_, Infallible>(handle(&registry, request).await) }
            }))
        }
    });

    let server = Server::try_bind(&address)?.serve(make_service);
    log::info!("Serving the registry API on {}...", address);

    let shutdown_platform = platform.clone();
    server
        .with_graceful_shutdown(async move { shutdown_platform.terminated().await })
        .await?;

    log::info!("The registry API has stopped.");
    Ok(())
}

async fn handle(registry: &Registry, request: Request<Body>) -> Response<Body> {
    if request.method() != Method::GET {
        let mut response = json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &error_body(
                StatusCode::METHOD_NOT_ALLOWED,
                "Only GET is supported by this API.",
            ),
        );
        let _ = response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET"));
        return response;
    }

    let path = request.uri().path().to_owned();
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();

    let result = match segments.as_slice() {
        [] => overview(registry).await,
        ["groups"] => group_listing(registry).await,
        ["groups", id] => group_document(registry, id).await,
        ["people"] => people_listing(registry).await,
        ["people", id] => person_document(registry, id).await,
        ["people", id, "photo"] => photo(registry, id).await,
        _ => {
            return json_response(
                StatusCode::NOT_FOUND,
                &error_body(
                    StatusCode::NOT_FOUND,
                    &format!("There is no resource at {}.", path),
                ),
            )
        }
    };

    result.unwrap_or_else(error_response)
}

async fn overview(registry: &Registry) -> Result<Response<Body>, RegistryError> {
    let groups: Vec<Value> = registry
        .groups()
        .await?
        .iter()
        .map(|id| Link::group(id).to_json())
        .collect();
    let people: Vec<Value> = registry
        .people()
        .await?
        .iter()
        .map(|id| Link::person(id).to_json())
        .collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({ "groups": groups, "people": people }),
    ))
}

async fn group_listing(registry: &Registry) -> Result<Response<Body>, RegistryError> {
    let links: Vec<Value> = registry
        .groups()
        .await?
        .iter()
        .map(|id| Link::group(id).to_json())
        .collect();

    Ok(json_response(StatusCode::OK, &Value::Array(links)))
}

async fn people_listing(registry: &Registry) -> Result<Response<Body>, RegistryError> {
    let links: Vec<Value> = registry
        .people()
        .await?
        .iter()
        .map(|id| Link::person(id).to_json())
        .collect();

    Ok(json_response(StatusCode::OK, &Value::Array(links)))
}

async fn group_document(registry: &Registry, id: &str) -> Result<Response<Body>, RegistryError> {
    let cached = registry.get_group(id).await?;
    Ok(json_response(StatusCode::OK, &group_json(&cached)))
}

fn group_json(cached: &Cached<Group>) -> Value {
    let group = cached.value();

    json!({
        "id": Link::group(&group.id).rel("self").value(group.name()).to_json(),
        "active": group.active,
        "description": group.description,
        "prelims": group.prelims,
        "pi": group
            .pi
            .as_ref()
            .map(|pi| Link::person(&pi.id).rel("pi").value(&pi.name).to_json()),
        "owners": group
            .owners
            .iter()
            .map(|owner| Link::person(&owner.id).rel("owner").value(&owner.name).to_json())
            .collect::<Vec<Value>>(),
        "members": group
            .members
            .iter()
            .map(|member| Link::person(&member.id).rel("member").value(&member.name).to_json())
            .collect::<Vec<Value>>(),
        "last_updated": cached.last_updated().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

async fn person_document(registry: &Registry, id: &str) -> Result<Response<Body>, RegistryError> {
    let cached = registry.get_person(id).await?;
    Ok(json_response(
        StatusCode::OK,
        &person_json(registry, &cached),
    ))
}

fn person_json(registry: &Registry, cached: &Cached<Person>) -> Value {
    let person = cached.value();

    // The involvements carry the role as reverse relation: the role is a property of the
    // group, merely reported from the person's point of view.
    let involvement: Vec<Value> = registry
        .involvement(&person.id)
        .iter()
        .map(|(group, role)| {
            Link::group(&group.id)
                .rev(role.as_str())
                .value(&group.name)
                .to_json()
        })
        .collect();

    let mut document = json!({
        "id": Link::person(&person.id).rel("self").value(&person.id).to_json(),
        "name": person.name,
        "mail": person.mail,
        "title": person.title,
        "human": person.human,
        "active": person.active,
        "involvement": involvement,
        "last_updated": cached.last_updated().to_rfc3339_opts(SecondsFormat::Secs, true),
    });

    if person.photo.is_some() {
        if let Value::Object(map) = &mut document {
            let _ = map.insert("photo".to_owned(), Link::photo(&person.id).to_json());
        }
    }

    document
}

async fn photo(registry: &Registry, id: &str) -> Result<Response<Body>, RegistryError> {
    let bytes = registry.photo(id).await?;

    let mut response = Response::new(Body::from(bytes));
    let _ = response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));

    Ok(response)
}

fn json_response(status: StatusCode, value: &Value) -> Response<Body> {
    let mut response = Response::new(Body::from(value.to_string()));
    *response.status_mut() = status;
    let _ = response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    response
}

fn error_body(status: StatusCode, description: &str) -> Value {
    json!({
        "status": status.as_u16(),
        "reason": status.canonical_reason().unwrap_or("Unknown"),
        "description": description,
    })
}

fn error_response(error: RegistryError) -> Response<Body> {
    let status = match &error {
        RegistryError::EntityNotFound(_) | RegistryError::PhotoNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        RegistryError::DirectoryUnavailable(_) | RegistryError::Resolution { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    json_response(status, &error_body(status, &error.to_string()))
}
