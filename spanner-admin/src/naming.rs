//! Resource names as the Spanner Admin API expects them.

/// `projects/{project}`
pub fn project_name(project_id: &str) -> String {
    format!("projects/{}", project_id)
}

/// `projects/{project}/instances/{instance}`
pub fn instance_name(project_id: &str, instance_id: &str) -> String {
    format!("projects/{}/instances/{}", project_id, instance_id)
}

/// `projects/{project}/instanceConfigs/{config}`
pub fn instance_config_name(project_id: &str, config: &str) -> String {
    format!("projects/{}/instanceConfigs/{}", project_id, config)
}

/// `projects/{project}/instances/{instance}/databases/{database}`
pub fn database_name(project_id: &str, instance_id: &str, database: &str) -> String {
    format!(
        "projects/{}/instances/{}/databases/{}",
        project_id, instance_id, database
    )
}

/// Last path segment of a resource name.
pub fn resource_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(project_name("acme"), "projects/acme");
        assert_eq!(instance_name("acme", "prod-1"), "projects/acme/instances/prod-1");
        assert_eq!(
            instance_config_name("acme", "regional-us-central1"),
            "projects/acme/instanceConfigs/regional-us-central1"
        );
        assert_eq!(
            database_name("acme", "prod-1", "orders"),
            "projects/acme/instances/prod-1/databases/orders"
        );
    }

    #[test]
    fn test_resource_id() {
        assert_eq!(resource_id("projects/acme/instances/prod-1"), "prod-1");
        assert_eq!(
            resource_id("projects/acme/instanceConfigs/nam3"),
            "nam3"
        );
        assert_eq!(resource_id("plain"), "plain");
    }
}
