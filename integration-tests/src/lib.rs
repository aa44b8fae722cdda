//! End-to-end tests for the tallycrab workspace; see `tests/`.
