//! Default entity catalogue
//!
//! The shared entity types every provider feeds into. Deployments may pass
//! their own catalogue to [`SqliteStore::new`](crate::SqliteStore::new).

use gleaner_domain::EntitySchema;

/// Research institutions (universities, institutes, companies)
pub const INSTITUTION: &str = "institution";
/// Researchers and project participants
pub const PERSON: &str = "person";
/// Subject classifications
pub const TOPIC: &str = "topic";
/// Funding programmes and calls
pub const FUNDING_PROGRAMME: &str = "funding_programme";
/// Funded projects
pub const PROJECT: &str = "project";

/// Build the default catalogue, parents before children
pub fn default_catalogue() -> Vec<EntitySchema> {
    vec![
        EntitySchema::new(INSTITUTION)
            .display("name")
            .unique(["ror_id"])
            .fields(["acronym", "country", "city", "website"]),
        EntitySchema::new(PERSON)
            .display("full_name")
            .unique(["orcid"])
            .fields(["given_name", "family_name", "email"]),
        EntitySchema::new(TOPIC)
            .display("label")
            .unique(["vocabulary", "code"]),
        EntitySchema::new(FUNDING_PROGRAMME)
            .display("title")
            .unique(["code"])
            .fields(["framework"]),
        EntitySchema::new(PROJECT)
            .display("title")
            .unique(["source", "external_id"])
            .parent("programme_id", FUNDING_PROGRAMME)
            .fields(["acronym", "start_date", "end_date", "total_cost"]),
    ]
}
