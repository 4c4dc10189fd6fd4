//! Every resource name is derived from the operator's unique name plus a fixed role suffix, so a
//! given unique name always maps to the same set of resources.

const SEARCH_SUFFIX: &str = "search";
const APP_SUFFIX: &str = "app";
const COGNITIVE_SUFFIX: &str = "cog";
const INSIGHTS_SUFFIX: &str = "insights";
const STORAGE_SUFFIX: &str = "str";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DerivedNames {
    pub(crate) unique_name: String,
    pub(crate) search_service: String,
    pub(crate) web_app: String,
    pub(crate) app_service_plan: String,
    pub(crate) cognitive_account: String,
    pub(crate) app_insights: String,
    pub(crate) storage_account: String,
    pub(crate) data_source: String,
    pub(crate) skillset: String,
    pub(crate) index: String,
    pub(crate) indexer: String,
}

impl DerivedNames {
    pub(crate) fn new(unique_name: &str) -> Self {
        let unique_name = unique_name.trim().to_lowercase();
        let suffixed = |suffix: &str| format!("{}{}", unique_name, suffix);
        let artifact = |kind: &str| format!("{}-{}", unique_name, kind);
        Self {
            search_service: suffixed(SEARCH_SUFFIX),
            web_app: suffixed(APP_SUFFIX),
            // Plans and sites are different resource types, so they can share a name.
            app_service_plan: suffixed(APP_SUFFIX),
            cognitive_account: suffixed(COGNITIVE_SUFFIX),
            app_insights: suffixed(INSIGHTS_SUFFIX),
            storage_account: suffixed(STORAGE_SUFFIX),
            data_source: artifact("datasource"),
            skillset: artifact("skillset"),
            index: artifact("index"),
            indexer: artifact("indexer"),
            unique_name,
        }
    }

    /// Operator guidance about names the cloud is likely to reject.  These are not enforced.
    pub(crate) fn naming_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let storage = &self.storage_account;
        if !(3..=24).contains(&storage.len()) {
            warnings.push(format!(
                "Storage account name '{}' is {} characters; storage accounts need 3-24",
                storage,
                storage.len()
            ));
        }
        if !storage.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            warnings.push(format!(
                "Storage account name '{}' should only contain lowercase letters and digits",
                storage
            ));
        }
        if self.search_service.len() > 60 {
            warnings.push(format!(
                "Search service name '{}' is longer than 60 characters",
                self.search_service
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::DerivedNames;

    #[test]
    fn suffixed_names() {
        let names = DerivedNames::new("fabrikam1");
        assert_eq!(names.search_service, "fabrikam1search");
        assert_eq!(names.web_app, "fabrikam1app");
        assert_eq!(names.app_service_plan, "fabrikam1app");
        assert_eq!(names.cognitive_account, "fabrikam1cog");
        assert_eq!(names.app_insights, "fabrikam1insights");
        assert_eq!(names.storage_account, "fabrikam1str");
        assert_eq!(names.data_source, "fabrikam1-datasource");
        assert_eq!(names.skillset, "fabrikam1-skillset");
        assert_eq!(names.index, "fabrikam1-index");
        assert_eq!(names.indexer, "fabrikam1-indexer");
    }

    #[test]
    fn derivation_is_stable() {
        assert_eq!(DerivedNames::new("Contoso7"), DerivedNames::new("contoso7"));
        assert_eq!(DerivedNames::new("contoso7").storage_account, "contoso7str");
    }

    #[test]
    fn naming_guidance() {
        assert!(DerivedNames::new("fabrikam1").naming_warnings().is_empty());

        let warnings = DerivedNames::new("a-very-long-unique-name-here").naming_warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("3-24"));
        assert!(warnings[1].contains("lowercase letters and digits"));
    }
}
