//! Authorization context: the immutable input of one `authorize` call

use crate::attributes::{AttributeValue, Attributes};
use crate::types::{OrganizationId, PrincipalId, ResourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key prefix for flattened resource attributes
pub const RESOURCE_PREFIX: &str = "resource_";

/// Key prefix for flattened environment attributes
pub const ENV_PREFIX: &str = "env_";

/// Dotted namespaces the attribute bags are also stored under, so that bag
/// keys such as `type` or `id` stay reachable next to the raw fields
pub const USER_NAMESPACE: &str = "user.";
pub const RESOURCE_NAMESPACE: &str = "resource.";
pub const ENV_NAMESPACE: &str = "env.";

/// Everything a single authorization decision is evaluated against
///
/// The builder methods consume the value while it is being assembled. Once
/// built, the engine only ever borrows it; enrichment produces a new context
/// ([`AuthorizationContext::merge_resource_attributes`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    principal_id: PrincipalId,
    #[serde(default)]
    organization_id: Option<OrganizationId>,
    resource_type: String,
    #[serde(default)]
    resource_id: Option<ResourceId>,
    action: String,
    #[serde(default)]
    user_attributes: Attributes,
    #[serde(default)]
    resource_attributes: Attributes,
    #[serde(default)]
    environment_attributes: Attributes,
    /// Pinned evaluation instant; unset means "when authorized"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_time: Option<DateTime<Utc>>,
}

impl AuthorizationContext {
    pub fn new(
        principal_id: PrincipalId,
        resource_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            principal_id,
            organization_id: None,
            resource_type: resource_type.into(),
            resource_id: None,
            action: action.into(),
            user_attributes: Attributes::new(),
            resource_attributes: Attributes::new(),
            environment_attributes: Attributes::new(),
            request_time: None,
        }
    }

    pub fn in_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// Like [`Self::in_organization`] but accepts an optional id
    pub fn with_organization(mut self, organization_id: Option<OrganizationId>) -> Self {
        self.organization_id = organization_id;
        self
    }

    pub fn on_resource(mut self, resource_id: ResourceId) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn with_resource_id(mut self, resource_id: Option<ResourceId>) -> Self {
        self.resource_id = resource_id;
        self
    }

    pub fn with_user_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.user_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.resource_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_environment_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.environment_attributes.insert(key.into(), value.into());
        self
    }

    /// Pin the instant time-derived attributes are computed from
    pub fn at(mut self, request_time: DateTime<Utc>) -> Self {
        self.request_time = Some(request_time);
        self
    }

    /// Context evaluated at `now`, unless a time was pinned with [`Self::at`]
    pub fn evaluated_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            request_time: Some(self.request_time.unwrap_or(now)),
            ..self.clone()
        }
    }

    /// New context whose resource bag is overlaid with `attributes`
    pub fn merge_resource_attributes(&self, attributes: &Attributes) -> Self {
        let mut resource_attributes = self.resource_attributes.clone();
        for (key, value) in attributes {
            resource_attributes.insert(key.clone(), value.clone());
        }

        Self {
            resource_attributes,
            ..self.clone()
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.resource_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn request_time(&self) -> Option<DateTime<Utc>> {
        self.request_time
    }

    pub fn user_attributes(&self) -> &Attributes {
        &self.user_attributes
    }

    pub fn resource_attributes(&self) -> &Attributes {
        &self.resource_attributes
    }

    pub fn environment_attributes(&self) -> &Attributes {
        &self.environment_attributes
    }

    pub fn user_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.user_attributes.get(key)
    }

    pub fn resource_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.resource_attributes.get(key)
    }

    pub fn environment_attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.environment_attributes.get(key)
    }

    /// Required permission in `resource_type:action` form
    pub fn permission_name(&self) -> String {
        format!("{}:{}", self.resource_type, self.action)
    }

    pub fn is_resource_owner(&self) -> bool {
        self.resource_attribute("owner_id").and_then(AttributeValue::as_str)
            == Some(self.principal_id.to_string().as_str())
    }

    /// Role names carried in the `roles` user attribute
    pub fn user_roles(&self) -> Vec<&str> {
        self.user_attribute("roles")
            .and_then(AttributeValue::as_list)
            .map(|roles| roles.iter().filter_map(AttributeValue::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user_roles().contains(&role)
    }

    /// Flatten the context into a single dictionary.
    ///
    /// User attributes are unprefixed, resource attributes use
    /// [`RESOURCE_PREFIX`] and environment attributes [`ENV_PREFIX`]. Raw
    /// context fields are written over those, so a bag can never shadow
    /// them. Every bag is also kept whole under its dotted namespace
    /// (`user.`, `resource.`, `env.`).
    pub fn to_dictionary(&self) -> Attributes {
        let mut dict = Attributes::new();

        for (key, value) in &self.user_attributes {
            dict.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.resource_attributes {
            dict.insert(format!("{RESOURCE_PREFIX}{key}"), value.clone());
        }
        for (key, value) in &self.environment_attributes {
            dict.insert(format!("{ENV_PREFIX}{key}"), value.clone());
        }

        dict.insert("user_id".into(), self.principal_id.into());
        dict.insert("organization_id".into(), self.organization_id.into());
        dict.insert("resource_type".into(), self.resource_type.clone().into());
        dict.insert("resource_id".into(), self.resource_id.into());
        dict.insert("action".into(), self.action.clone().into());
        dict.insert("request_time".into(), self.request_time.into());

        let namespaced = [
            (USER_NAMESPACE, &self.user_attributes),
            (RESOURCE_NAMESPACE, &self.resource_attributes),
            (ENV_NAMESPACE, &self.environment_attributes),
        ];
        for (namespace, bag) in namespaced {
            for (key, value) in bag {
                dict.insert(format!("{namespace}{key}"), value.clone());
            }
        }

        dict
    }
}
