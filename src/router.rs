//! Path dispatch, delegated to the external [`matchit`] radix-tree router.
//!
//! One tree per HTTP method, mapping a path pattern to an opaque route id.
//! The framework treats matching as a black box: it registers patterns at
//! build time and asks for `(route id, ordered path parameters)` per request.
//! Everything else — the queueing, the error protocol, the route wrappers —
//! lives elsewhere.

use std::collections::HashMap;

use matchit::Router as MatchitRouter;

use crate::method::Method;

/// Index into the service's route table.
pub(crate) type RouteId = usize;

#[derive(Default)]
pub(crate) struct Dispatcher {
    trees: HashMap<Method, MatchitRouter<RouteId>>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a pattern under one method. Patterns use `{name}` parameter
    /// syntax.
    ///
    /// # Panics
    ///
    /// Panics on an invalid or conflicting pattern — route tables are built
    /// at startup, where failing loudly beats serving a broken table.
    pub(crate) fn insert(&mut self, method: Method, path: &str, id: RouteId) {
        self.trees
            .entry(method)
            .or_default()
            .insert(path, id)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
    }

    /// Matches `path` against the trees for `method`.
    ///
    /// Returns the route id and the path parameters as an ordered list —
    /// declaration order in the pattern, which is what keeps positional
    /// parameter access stable.
    pub(crate) fn dispatch(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(RouteId, Vec<(String, String)>)> {
        let tree = self.trees.get(&method)?;
        let matched = tree.at(path).ok()?;

        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        Some((*matched.value, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_is_per_method() {
        let mut d = Dispatcher::new();
        d.insert(Method::Get, "/users", 0);
        d.insert(Method::Post, "/users", 1);

        assert_eq!(d.dispatch(Method::Get, "/users").map(|(id, _)| id), Some(0));
        assert_eq!(d.dispatch(Method::Post, "/users").map(|(id, _)| id), Some(1));
        assert!(d.dispatch(Method::Delete, "/users").is_none());
    }

    #[test]
    fn params_keep_declaration_order() {
        let mut d = Dispatcher::new();
        d.insert(Method::Get, "/users/{id}/posts/{post}", 7);

        let (id, params) = d.dispatch(Method::Get, "/users/42/posts/9").unwrap();
        assert_eq!(id, 7);
        assert_eq!(
            params,
            vec![
                ("id".to_owned(), "42".to_owned()),
                ("post".to_owned(), "9".to_owned()),
            ]
        );
    }

    #[test]
    fn unmatched_paths_return_none() {
        let mut d = Dispatcher::new();
        d.insert(Method::Get, "/", 0);

        assert!(d.dispatch(Method::Get, "/missing").is_none());
    }
}
