//! REST route to XML-RPC action naming
//!
//! ```rust
//! use xrpc_proxy::action_name;
//!
//! assert_eq!(action_name("GET", "/user/:id"), "getUserId");
//! assert_eq!(action_name("GET", "/users"), "getUsers");
//! assert_eq!(action_name("GET", "/"), "getAll");
//! ```

/// Canonical action name for an HTTP method and path template
///
/// Slashes become separators, `:` markers are dropped, and the rest is
/// camel-cased: separators (`_`, `-`, whitespace) are removed and the
/// character after each run of them is upper-cased. An empty result becomes
/// `All`. The lower-cased method is prepended.
pub fn action_name(method: &str, path: &str) -> String {
    let flattened: String = path
        .trim()
        .chars()
        .filter(|c| *c != ':')
        .map(|c| if c == '/' { '_' } else { c })
        .collect();

    let mut name = method.to_ascii_lowercase();
    let mut suffix = String::with_capacity(flattened.len());
    let mut upper_next = false;
    for c in flattened.chars() {
        if is_separator(c) {
            upper_next = true;
        } else if upper_next {
            suffix.extend(c.to_uppercase());
            upper_next = false;
        } else {
            suffix.push(c);
        }
    }

    if suffix.is_empty() {
        name.push_str("All");
    } else {
        name.push_str(&suffix);
    }
    name
}

fn is_separator(c: char) -> bool {
    c == '_' || c == '-' || c.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_routes() {
        assert_eq!(action_name("GET", "/user/:id"), "getUserId");
        assert_eq!(action_name("GET", "/users"), "getUsers");
        assert_eq!(action_name("GET", "/"), "getAll");
        assert_eq!(action_name("get", ""), "getAll");
    }

    #[test]
    fn test_separators_collapse() {
        assert_eq!(action_name("POST", "/user-profile/:user_id"), "postUserProfileUserId");
        assert_eq!(action_name("DELETE", "//posts//:id/"), "deletePostsId");
        assert_eq!(action_name("PUT", "/blog/posts"), "putBlogPosts");
    }

    #[test]
    fn test_existing_case_is_kept() {
        assert_eq!(action_name("GET", "/getUsersBlogs"), "getGetUsersBlogs");
        assert_eq!(action_name("GET", "/users/me/avatarURL"), "getUsersMeAvatarURL");
    }
}
