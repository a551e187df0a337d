//! English-centric naming helpers used to derive aliases, keys and table names

/// Simple pluralization
pub fn pluralize(name: &str) -> String {
    if name.ends_with('y')
        && !["ay", "ey", "iy", "oy", "uy"].iter().any(|suffix| name.ends_with(suffix))
    {
        format!("{}ies", &name[..name.len() - 1])
    } else if name.ends_with('s')
        || name.ends_with("sh")
        || name.ends_with("ch")
        || name.ends_with('x')
        || name.ends_with('z')
    {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

/// Simple singularization
pub fn singularize(name: &str) -> String {
    if name.ends_with("ies") && name.len() > 3 {
        format!("{}y", &name[..name.len() - 3])
    } else if ["sses", "ches", "shes", "xes", "zes"].iter().any(|suffix| name.ends_with(suffix)) {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") && name.len() > 1 {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

/// `<model>_<key>` in lowercase, the default name of a key referencing `model`
pub fn foreign_key_for(model_name: &str, primary_key: &str) -> String {
    format!("{}_{}", model_name, primary_key).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralization() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("post"), "posts");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("class"), "classes");
    }

    #[test]
    fn test_singularization() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("classes"), "class");
        assert_eq!(singularize("class"), "class");
        assert_eq!(singularize("user"), "user");
    }

    #[test]
    fn test_foreign_key_for() {
        assert_eq!(foreign_key_for("User", "id"), "user_id");
        assert_eq!(foreign_key_for("PostTag", "ID"), "posttag_id");
    }
}
