use feature_tree::db::Database;
use feature_tree::models::*;
use feature_tree::serialize::{self, ExportFormat, ImportFormat};
use feature_tree::{BulkCreateError, TreeError};
use speculate2::speculate;
use uuid::Uuid;

fn create_test_project(db: &Database) -> Project {
    db.create_project(CreateProjectInput {
        name: "Test Project".to_string(),
        description: None,
    })
    .expect("Failed to create project")
}

fn add_node(db: &Database, project_id: Uuid, parent_id: Option<Uuid>, title: &str) -> FeatureNode {
    db.create_node(
        project_id,
        CreateNodeInput {
            parent_id,
            title: title.to_string(),
            ..Default::default()
        },
    )
    .expect("Failed to create node")
}

fn status_of(db: &Database, project_id: Uuid, id: Uuid) -> NodeStatus {
    db.get_node(project_id, id)
        .expect("Query failed")
        .expect("Node missing")
        .status
}

fn entry(temp_id: &str, parent: Option<&str>, title: &str, level: NodeLevel) -> BulkNodeInput {
    BulkNodeInput {
        temp_id: temp_id.to_string(),
        parent_temp_id: parent.map(str::to_string),
        title: title.to_string(),
        description: None,
        level,
        status: None,
    }
}

/// (title, level, status, depth) for every live node in pre-order.
fn shape(db: &Database, project_id: Uuid) -> Vec<(String, NodeLevel, NodeStatus, usize)> {
    let forest = db.get_tree(project_id).expect("Failed to get tree");
    let mut out = Vec::new();
    for root in &forest {
        root.walk(0, &mut |tree_node, depth| {
            out.push((
                tree_node.node.title.clone(),
                tree_node.node.level,
                tree_node.node.status,
                depth,
            ))
        });
    }
    out
}

/// Checkout { Payment, Shipping { Rates { Carrier API } } }, Search
fn build_sample(db: &Database, project_id: Uuid) -> Vec<FeatureNode> {
    let checkout = add_node(db, project_id, None, "Checkout");
    let payment = add_node(db, project_id, Some(checkout.id), "Payment");
    let shipping = add_node(db, project_id, Some(checkout.id), "Shipping");
    let rates = add_node(db, project_id, Some(shipping.id), "Rates");
    let carrier = add_node(db, project_id, Some(rates.id), "Carrier API");
    let search = add_node(db, project_id, None, "Search");
    vec![checkout, payment, shipping, rates, carrier, search]
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        it "creates and lists projects" {
            let project = db.create_project(CreateProjectInput {
                name: "Storefront".to_string(),
                description: Some("Web shop".to_string()),
            }).expect("Failed to create project");

            let projects = db.get_all_projects().expect("Query failed");
            assert_eq!(projects.len(), 1);
            assert_eq!(projects[0].id, project.id);
            assert_eq!(projects[0].description.as_deref(), Some("Web shop"));
        }

        it "rejects an empty name" {
            let result = db.create_project(CreateProjectInput {
                name: "   ".to_string(),
                description: None,
            });
            assert!(matches!(result, Err(TreeError::Validation(_))));
        }

        it "returns None for a missing project" {
            assert!(db.get_project(Uuid::new_v4()).expect("Query failed").is_none());
        }
    }

    describe "create_node" {
        it "derives levels from the parent" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);

            let levels: Vec<_> = nodes.iter().map(|n| n.level).collect();
            assert_eq!(levels, vec![
                NodeLevel::Epic,
                NodeLevel::Feature,
                NodeLevel::Feature,
                NodeLevel::SubFeature,
                NodeLevel::Task,
                NodeLevel::Epic,
            ]);
            assert!(nodes.iter().all(|n| n.status == NodeStatus::NotStarted));
        }

        it "refuses children under a task" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);
            let task = &nodes[4];

            let result = db.create_node(project.id, CreateNodeInput {
                parent_id: Some(task.id),
                title: "Too deep".to_string(),
                ..Default::default()
            });
            assert!(matches!(result, Err(TreeError::Validation(_))));
        }

        it "assigns strictly increasing positions after the current max" {
            let project = create_test_project(&db);
            let epic = add_node(&db, project.id, None, "Epic");

            let positions: Vec<i64> = (0..5)
                .map(|i| add_node(&db, project.id, Some(epic.id), &format!("F{}", i)).position)
                .collect();
            assert_eq!(positions, vec![0, 1, 2, 3, 4]);

            db.delete_node(project.id, child_at(&db, project.id, epic.id, 4)).expect("Delete failed");
            let next = add_node(&db, project.id, Some(epic.id), "After delete");
            assert_eq!(next.position, 4, "live max + 1 after deleting the last sibling");
        }

        it "reports a missing parent as not found" {
            let project = create_test_project(&db);
            let result = db.create_node(project.id, CreateNodeInput {
                parent_id: Some(Uuid::new_v4()),
                title: "Orphan".to_string(),
                ..Default::default()
            });
            assert!(matches!(result, Err(TreeError::NotFound { entity: "Parent node", .. })));
        }

        it "reports a missing project as not found" {
            let result = db.create_node(Uuid::new_v4(), CreateNodeInput {
                title: "Nowhere".to_string(),
                ..Default::default()
            });
            assert!(matches!(result, Err(TreeError::NotFound { entity: "Project", .. })));
        }

        it "rejects an empty title" {
            let project = create_test_project(&db);
            let result = db.create_node(project.id, CreateNodeInput {
                title: "".to_string(),
                ..Default::default()
            });
            assert!(matches!(result, Err(TreeError::Validation(_))));
        }
    }

    describe "get_tree" {
        it "nests live nodes sorted by position" {
            let project = create_test_project(&db);
            build_sample(&db, project.id);

            let forest = db.get_tree(project.id).expect("Failed to get tree");
            assert_eq!(forest.len(), 2);
            assert_eq!(forest[0].node.title, "Checkout");
            assert_eq!(forest[1].node.title, "Search");
            let children: Vec<_> = forest[0].children.iter().map(|c| c.node.title.as_str()).collect();
            assert_eq!(children, vec!["Payment", "Shipping"]);
            assert_eq!(forest[0].children[1].children[0].children[0].node.title, "Carrier API");
        }

        it "returns an empty forest for an empty project" {
            let project = create_test_project(&db);
            assert!(db.get_tree(project.id).expect("Failed to get tree").is_empty());
        }
    }

    describe "update_status" {
        it "rolls a blocked feature up to its epic" {
            let project = create_test_project(&db);
            let checkout = add_node(&db, project.id, None, "Checkout");
            let payment = add_node(&db, project.id, Some(checkout.id), "Payment");
            let shipping = add_node(&db, project.id, Some(checkout.id), "Shipping");

            db.update_status(project.id, payment.id, NodeStatus::Complete).expect("Update failed");
            db.update_status(project.id, shipping.id, NodeStatus::InProgress).expect("Update failed");
            assert_eq!(status_of(&db, project.id, checkout.id), NodeStatus::InProgress);

            let result = db.update_status(project.id, shipping.id, NodeStatus::Blocked).expect("Update failed");

            assert_eq!(result.node.status, NodeStatus::Blocked);
            assert!(result.cascade_complete);
            assert_eq!(result.cascade_log, vec![StatusChange {
                node_id: checkout.id,
                old_status: NodeStatus::InProgress,
                new_status: NodeStatus::Blocked,
            }]);
            assert_eq!(status_of(&db, project.id, checkout.id), NodeStatus::Blocked);
        }

        it "propagates through every level and stops when nothing changes" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);
            let (checkout, shipping, rates, carrier) = (&nodes[0], &nodes[2], &nodes[3], &nodes[4]);

            let result = db.update_status(project.id, carrier.id, NodeStatus::Complete).expect("Update failed");
            let changed: Vec<_> = result.cascade_log.iter().map(|c| (c.node_id, c.new_status)).collect();
            assert_eq!(changed, vec![
                (rates.id, NodeStatus::Complete),
                (shipping.id, NodeStatus::Complete),
                (checkout.id, NodeStatus::InProgress),
            ]);
        }

        it "is a no-op when the status is unchanged" {
            let project = create_test_project(&db);
            let epic = add_node(&db, project.id, None, "Epic");
            let feature = add_node(&db, project.id, Some(epic.id), "Feature");

            let result = db.update_status(project.id, feature.id, NodeStatus::NotStarted).expect("Update failed");
            assert!(result.cascade_log.is_empty());
            assert!(result.cascade_complete);
            assert_eq!(result.node.status, NodeStatus::NotStarted);
            assert_eq!(status_of(&db, project.id, epic.id), NodeStatus::NotStarted);
        }

        it "keeps every parent consistent with its children" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);
            db.update_status(project.id, nodes[1].id, NodeStatus::Blocked).expect("Update failed");
            db.update_status(project.id, nodes[4].id, NodeStatus::InProgress).expect("Update failed");
            db.update_status(project.id, nodes[1].id, NodeStatus::Complete).expect("Update failed");

            let forest = db.get_tree(project.id).expect("Failed to get tree");
            for tree_node in flatten_forest(&forest) {
                if tree_node.children.is_empty() {
                    continue;
                }
                let statuses: Vec<_> = tree_node.children.iter().map(|c| c.node.status).collect();
                assert_eq!(tree_node.node.status, aggregate_status(&statuses), "{}", tree_node.node.title);
            }
        }

        it "reports a missing node as not found" {
            let project = create_test_project(&db);
            let result = db.update_status(project.id, Uuid::new_v4(), NodeStatus::Complete);
            assert!(matches!(result, Err(TreeError::NotFound { .. })));
        }
    }

    describe "update_node" {
        it "changes text fields only" {
            let project = create_test_project(&db);
            let epic = add_node(&db, project.id, None, "Epic");

            let updated = db.update_node(project.id, epic.id, UpdateNodeInput {
                title: Some("Checkout".to_string()),
                description: Some("Everything after the cart".to_string()),
            }).expect("Update failed");

            assert_eq!(updated.title, "Checkout");
            assert_eq!(updated.level, NodeLevel::Epic);
            assert_eq!(updated.position, epic.position);
        }

        it "keeps an omitted description and clears a blank one" {
            let project = create_test_project(&db);
            let epic = add_node(&db, project.id, None, "Epic");
            db.update_node(project.id, epic.id, UpdateNodeInput {
                title: None,
                description: Some("Everything after the cart".to_string()),
            }).expect("Update failed");

            let renamed = db.update_node(project.id, epic.id, UpdateNodeInput {
                title: Some("Checkout".to_string()),
                description: None,
            }).expect("Update failed");
            assert_eq!(renamed.description.as_deref(), Some("Everything after the cart"));

            db.update_node(project.id, epic.id, UpdateNodeInput {
                title: None,
                description: Some(String::new()),
            }).expect("Update failed");
            let stored = db.get_node(project.id, epic.id).expect("Query failed").expect("Node missing");
            assert_eq!(stored.description, None);
        }
    }

    describe "delete_node and restore_node" {
        it "soft-deletes the subtree and recomputes the parent" {
            let project = create_test_project(&db);
            let checkout = add_node(&db, project.id, None, "Checkout");
            let payment = add_node(&db, project.id, Some(checkout.id), "Payment");
            let shipping = add_node(&db, project.id, Some(checkout.id), "Shipping");
            let rates = add_node(&db, project.id, Some(shipping.id), "Rates");
            db.update_status(project.id, payment.id, NodeStatus::Complete).expect("Update failed");
            db.update_status(project.id, rates.id, NodeStatus::Blocked).expect("Update failed");
            assert_eq!(status_of(&db, project.id, checkout.id), NodeStatus::Blocked);

            let marked = db.delete_node(project.id, shipping.id).expect("Delete failed");

            assert_eq!(marked, 2);
            assert!(db.get_node(project.id, rates.id).expect("Query failed").is_none());
            assert_eq!(status_of(&db, project.id, checkout.id), NodeStatus::Complete);
        }

        it "restores the node at its old position without its descendants" {
            let project = create_test_project(&db);
            let epic = add_node(&db, project.id, None, "Epic");
            let first = add_node(&db, project.id, Some(epic.id), "First");
            add_node(&db, project.id, Some(epic.id), "Second");
            let child = add_node(&db, project.id, Some(first.id), "Child");

            db.delete_node(project.id, first.id).expect("Delete failed");
            let restored = db.restore_node(project.id, first.id).expect("Restore failed");

            assert_eq!(restored.position, first.position);
            assert!(!restored.is_deleted());
            assert!(db.get_node(project.id, child.id).expect("Query failed").is_none());
        }

        it "re-appends a restored node whose position was taken" {
            let project = create_test_project(&db);
            let a = add_node(&db, project.id, None, "A");
            db.delete_node(project.id, a.id).expect("Delete failed");
            let b = add_node(&db, project.id, None, "B");
            assert_eq!(b.position, a.position);

            let restored = db.restore_node(project.id, a.id).expect("Restore failed");
            assert_eq!(restored.position, b.position + 1);
        }

        it "refuses to restore under a deleted parent" {
            let project = create_test_project(&db);
            let epic = add_node(&db, project.id, None, "Epic");
            let feature = add_node(&db, project.id, Some(epic.id), "Feature");
            db.delete_node(project.id, epic.id).expect("Delete failed");

            let result = db.restore_node(project.id, feature.id);
            assert!(matches!(result, Err(TreeError::Validation(_))));
        }

        it "refuses to restore a live node" {
            let project = create_test_project(&db);
            let epic = add_node(&db, project.id, None, "Epic");
            assert!(matches!(db.restore_node(project.id, epic.id), Err(TreeError::Validation(_))));
        }
    }

    describe "bulk_create" {
        it "links children to their parents' real ids" {
            let project = create_test_project(&db);
            let result = db.bulk_create(project.id, BulkCreateInput {
                nodes: vec![
                    entry("a", None, "Checkout", NodeLevel::Epic),
                    entry("b", Some("a"), "Payment", NodeLevel::Feature),
                ],
                created_by: None,
            }).expect("Bulk create failed");

            assert_eq!(result.created_count, 2);
            let b = db.get_node(project.id, result.id_map["b"]).expect("Query failed").expect("b missing");
            assert_eq!(b.parent_id, Some(result.id_map["a"]));
        }

        it "inserts parents first whatever the input order" {
            let project = create_test_project(&db);
            let result = db.bulk_create(project.id, BulkCreateInput {
                nodes: vec![
                    entry("t", Some("s"), "Task", NodeLevel::Task),
                    entry("f2", Some("e"), "Second feature", NodeLevel::Feature),
                    entry("s", Some("f1"), "Sub", NodeLevel::SubFeature),
                    entry("f1", Some("e"), "First feature", NodeLevel::Feature),
                    entry("e", None, "Epic", NodeLevel::Epic),
                ],
                created_by: Some("planner".to_string()),
            }).expect("Bulk create failed");

            let order: Vec<Uuid> = result.real_ids.clone();
            let index_of = |temp: &str| order.iter().position(|id| *id == result.id_map[temp]).expect("missing id");
            assert!(index_of("e") < index_of("f1"));
            assert!(index_of("e") < index_of("f2"));
            assert!(index_of("f1") < index_of("s"));
            assert!(index_of("s") < index_of("t"));

            let titles: Vec<_> = shape(&db, project.id).into_iter().map(|(t, ..)| t).collect();
            assert_eq!(titles, vec!["Epic", "Second feature", "First feature", "Sub", "Task"]);
        }

        it "appends new roots after existing ones" {
            let project = create_test_project(&db);
            let existing = add_node(&db, project.id, None, "Existing");
            let result = db.bulk_create(project.id, BulkCreateInput {
                nodes: vec![entry("a", None, "New", NodeLevel::Epic)],
                created_by: None,
            }).expect("Bulk create failed");

            let new = db.get_node(project.id, result.id_map["a"]).expect("Query failed").expect("missing");
            assert_eq!(new.position, existing.position + 1);
        }

        it "writes nothing when a parent reference is unknown" {
            let project = create_test_project(&db);
            let result = db.bulk_create(project.id, BulkCreateInput {
                nodes: vec![
                    entry("a", None, "Checkout", NodeLevel::Epic),
                    entry("b", Some("zzz"), "Payment", NodeLevel::Feature),
                ],
                created_by: None,
            });

            assert!(matches!(result, Err(BulkCreateError::Rejected(TreeError::Validation(_)))));
            assert!(db.get_tree(project.id).expect("Failed to get tree").is_empty());
        }

        it "accepts an empty batch without writing" {
            let project = create_test_project(&db);
            let result = db.bulk_create(project.id, BulkCreateInput {
                nodes: vec![],
                created_by: None,
            }).expect("Bulk create failed");

            assert_eq!(result.created_count, 0);
            assert!(result.real_ids.is_empty());
            assert!(result.id_map.is_empty());
            assert!(db.get_tree(project.id).expect("Failed to get tree").is_empty());
        }

        it "rejects batches over the size limit" {
            let project = create_test_project(&db);
            let nodes = (0..=MAX_BATCH_SIZE)
                .map(|i| entry(&format!("e{}", i), None, "Epic", NodeLevel::Epic))
                .collect();
            let result = db.bulk_create(project.id, BulkCreateInput { nodes, created_by: None });
            assert!(matches!(result, Err(BulkCreateError::Rejected(TreeError::Validation(_)))));
        }

        it "rejects an unknown project" {
            let result = db.bulk_create(Uuid::new_v4(), BulkCreateInput {
                nodes: vec![entry("a", None, "Checkout", NodeLevel::Epic)],
                created_by: None,
            });
            assert!(matches!(result, Err(BulkCreateError::Rejected(TreeError::NotFound { .. }))));
        }
    }

    describe "search" {
        it "returns every live node when unfiltered" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);
            db.delete_node(project.id, nodes[5].id).expect("Delete failed");

            let result = db.search(project.id, &SearchQuery::default()).expect("Search failed");

            let live: Vec<Uuid> = nodes[..5].iter().map(|n| n.id).collect();
            assert_eq!(result.matching_ids, live);
            assert_eq!(result.display_ids, live);
            assert_eq!(result.total_matches, 5);
        }

        it "includes ancestors of matches for display" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);
            db.update_node(project.id, nodes[4].id, UpdateNodeInput {
                title: None,
                description: Some("Talks to the CARRIER rate service".to_string()),
            }).expect("Update failed");

            let result = db.search(project.id, &SearchQuery {
                query: Some("rate service".to_string()),
                ..Default::default()
            }).expect("Search failed");

            assert_eq!(result.matching_ids, vec![nodes[4].id]);
            assert_eq!(result.display_ids, vec![nodes[0].id, nodes[2].id, nodes[3].id, nodes[4].id]);
        }

        it "intersects status and level filters and counts the whole tree" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);
            db.update_status(project.id, nodes[1].id, NodeStatus::Blocked).expect("Update failed");

            let result = db.search(project.id, &SearchQuery {
                query: None,
                statuses: vec![NodeStatus::Blocked],
                levels: vec![NodeLevel::Feature],
            }).expect("Search failed");

            assert_eq!(result.matching_ids, vec![nodes[1].id]);
            assert_eq!(result.status_counts[&NodeStatus::Blocked], 2);
            assert_eq!(result.status_counts[&NodeStatus::Complete], 0);
            assert_eq!(result.level_counts[&NodeLevel::Epic], 2);
        }

        it "treats an empty query as no query" {
            let project = create_test_project(&db);
            build_sample(&db, project.id);
            let result = db.search(project.id, &SearchQuery {
                query: Some(String::new()),
                ..Default::default()
            }).expect("Search failed");
            assert_eq!(result.total_matches, 6);
        }

        it "matches surrounding whitespace literally" {
            let project = create_test_project(&db);
            let nodes = build_sample(&db, project.id);

            let result = db.search(project.id, &SearchQuery {
                query: Some(" api".to_string()),
                ..Default::default()
            }).expect("Search failed");
            assert_eq!(result.matching_ids, vec![nodes[4].id]);

            let result = db.search(project.id, &SearchQuery {
                query: Some("   ".to_string()),
                ..Default::default()
            }).expect("Search failed");
            assert_eq!(result.total_matches, 0);
        }
    }

    describe "export and import" {
        it "round-trips a tree through the structured format" {
            let source = create_test_project(&db);
            let nodes = build_sample(&db, source.id);
            db.update_status(source.id, nodes[1].id, NodeStatus::Complete).expect("Update failed");
            db.update_status(source.id, nodes[4].id, NodeStatus::Blocked).expect("Update failed");

            let document = db.export(source.id, ExportFormat::Structured, true).expect("Export failed");
            let batch = serialize::import(&document, ImportFormat::Structured).expect("Import failed");

            let target = create_test_project(&db);
            db.bulk_create(target.id, BulkCreateInput { nodes: batch, created_by: None })
                .expect("Bulk create failed");

            assert_eq!(shape(&db, target.id), shape(&db, source.id));
        }

        it "round-trips a tree through the tabular format" {
            let source = create_test_project(&db);
            let nodes = build_sample(&db, source.id);
            db.update_status(source.id, nodes[2].id, NodeStatus::InProgress).expect("Update failed");

            let document = db.export(source.id, ExportFormat::Tabular, false).expect("Export failed");
            let batch = serialize::import(&document, ImportFormat::Tabular).expect("Import failed");

            let target = create_test_project(&db);
            db.bulk_create(target.id, BulkCreateInput { nodes: batch, created_by: None })
                .expect("Bulk create failed");

            assert_eq!(shape(&db, target.id), shape(&db, source.id));
        }

        it "keeps whitespace in descriptions through the tabular format" {
            let source = create_test_project(&db);
            let snippet = add_node(&db, source.id, None, "Snippet");
            db.update_node(source.id, snippet.id, UpdateNodeInput {
                title: None,
                description: Some("  indented code\n".to_string()),
            }).expect("Update failed");

            let document = db.export(source.id, ExportFormat::Tabular, true).expect("Export failed");
            let batch = serialize::import(&document, ImportFormat::Tabular).expect("Import failed");
            assert_eq!(batch[0].description.as_deref(), Some("  indented code\n"));

            let target = create_test_project(&db);
            let result = db.bulk_create(target.id, BulkCreateInput { nodes: batch, created_by: None })
                .expect("Bulk create failed");
            let copy = db.get_node(target.id, result.real_ids[0]).expect("Query failed").expect("Node missing");
            assert_eq!(copy.description.as_deref(), Some("  indented code\n"));
        }

        it "renders an outline with status symbols" {
            let project = create_test_project(&db);
            let checkout = add_node(&db, project.id, None, "Checkout");
            let payment = add_node(&db, project.id, Some(checkout.id), "Payment");
            db.update_status(project.id, payment.id, NodeStatus::Complete).expect("Update failed");

            let outline = db.export(project.id, ExportFormat::Outline, false).expect("Export failed");
            assert_eq!(outline, "● [Epic] Checkout (complete)\n  ● [Feature] Payment (complete)\n");
        }

        it "fails to export an unknown project" {
            let result = db.export(Uuid::new_v4(), ExportFormat::Structured, false);
            assert!(matches!(result, Err(TreeError::NotFound { .. })));
        }
    }
}

fn child_at(db: &Database, project_id: Uuid, parent_id: Uuid, position: i64) -> Uuid {
    db.get_children(project_id, parent_id)
        .expect("Query failed")
        .into_iter()
        .find(|n| n.position == position)
        .map(|n| n.id)
        .expect("No child at position")
}
