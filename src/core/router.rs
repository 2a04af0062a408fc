//! Broadcast routing
//!
//! `route` turns an `Outcome` into a `Plan` without touching any shared
//! state. Targets are relative to the connection that triggered the event.
//! The server applies subscription changes first, then deliveries in order,
//! then dissolves rooms.

use crate::constants::ADMIN_DISPLAY_NAME;
use crate::core::membership::{GroupDeparture, Outcome};
use crate::core::message_types::*;
use crate::core::rooms::RoomKey;

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The triggering connection only
    Origin,
    Room(RoomKey),
    /// A room minus the triggering connection
    RoomExceptOrigin(RoomKey),
    /// Every live connection
    Everyone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: Target,
    pub event: ServerEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Subscription {
    Join(RoomKey),
    Leave(RoomKey),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub subscriptions: Vec<Subscription>,
    pub deliveries: Vec<Delivery>,
    /// Rooms emptied once everything is delivered
    pub dissolve_rooms: Vec<RoomKey>,
    /// Class whose rooms are dissolved once everything is delivered
    pub dissolve_class: Option<String>,
}

impl Plan {
    fn subscribe(&mut self, change: Subscription) -> &mut Self {
        self.subscriptions.push(change);
        self
    }

    fn send(&mut self, target: Target, event: ServerEvent) -> &mut Self {
        self.deliveries.push(Delivery { target, event });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
            && self.deliveries.is_empty()
            && self.dissolve_rooms.is_empty()
            && self.dissolve_class.is_none()
    }
}

fn departure_fan_out(plan: &mut Plan, departure: &GroupDeparture) {
    let handle = departure.class_handle.as_str();
    let membership = MembershipPayload {
        username: departure.username.clone(),
        class_id: handle.to_string(),
        group_id: departure.group_id,
        status: false,
        disconnect: departure.disconnect,
        group_size: Some(departure.group_size),
        other_members: Vec::new(),
    };
    let info = GroupInfoPayload {
        username: Some(departure.username.clone()),
        class_id: handle.to_string(),
        group_id: departure.group_id,
        status: false,
        disconnect: departure.disconnect,
        other_members: departure.remaining.clone(),
    };

    plan.subscribe(Subscription::Leave(RoomKey::group(handle, departure.group_id)))
        .send(Target::Origin, ServerEvent::GroupLeaveResponse(membership.clone()))
        .send(
            Target::Room(RoomKey::group(handle, departure.group_id)),
            ServerEvent::GroupInfoResponse(info.clone()),
        )
        .send(
            Target::Room(RoomKey::class(handle)),
            ServerEvent::GroupNumbersResponse(membership),
        )
        .send(
            Target::Room(RoomKey::admin(handle)),
            ServerEvent::GroupInfoResponse(info),
        );
}

/// Compute the fan-out of one outcome
pub fn route(outcome: &Outcome) -> Plan {
    let mut plan = Plan::default();

    match outcome {
        Outcome::Silent => {}

        Outcome::LoggedIn {
            username,
            class_handle,
        } => {
            plan.send(
                Target::Origin,
                ServerEvent::LoginResponse(LoginPayload {
                    username: username.clone(),
                    class_id: class_handle.clone(),
                }),
            );
        }

        Outcome::LoggedOut {
            username,
            class_handle,
            disconnect,
            departure,
        } => {
            if let Some(departure) = departure {
                departure_fan_out(&mut plan, departure);
            }
            plan.subscribe(Subscription::Leave(RoomKey::class(class_handle)))
                .send(
                    Target::Origin,
                    ServerEvent::LogoutResponse(LogoutPayload {
                        username: Some(username.clone()),
                        class_id: class_handle.clone(),
                        disconnect: *disconnect,
                    }),
                );
        }

        Outcome::GroupsListed {
            username,
            class_handle,
            groups,
        } => {
            plan.subscribe(Subscription::Join(RoomKey::class(class_handle)))
                .send(
                    Target::Origin,
                    ServerEvent::GroupsGetResponse(GroupsPayload {
                        username: username.clone(),
                        class_id: class_handle.clone(),
                        groups: groups.clone(),
                    }),
                );
        }

        Outcome::GroupJoined {
            username,
            class_handle,
            group_id,
            group_size,
            member,
        } => {
            let membership = MembershipPayload {
                username: username.clone(),
                class_id: class_handle.clone(),
                group_id: *group_id,
                status: true,
                disconnect: false,
                group_size: Some(*group_size),
                other_members: vec![member.clone()],
            };
            let info = GroupInfoPayload {
                username: Some(username.clone()),
                class_id: class_handle.clone(),
                group_id: *group_id,
                status: true,
                disconnect: false,
                other_members: vec![member.clone()],
            };

            plan.subscribe(Subscription::Join(RoomKey::group(class_handle, *group_id)))
                .send(Target::Origin, ServerEvent::GroupJoinResponse(membership.clone()))
                .send(
                    Target::Room(RoomKey::class(class_handle)),
                    ServerEvent::GroupNumbersResponse(membership),
                )
                .send(
                    Target::Room(RoomKey::admin(class_handle)),
                    ServerEvent::GroupInfoResponse(info),
                );
        }

        Outcome::GroupLeft(departure) => departure_fan_out(&mut plan, departure),

        Outcome::GroupInfo {
            username,
            class_handle,
            group_id,
            status,
            members,
            requester,
        } => {
            let payload = |other_members: Vec<MemberInfo>| GroupInfoPayload {
                username: Some(username.clone()),
                class_id: class_handle.clone(),
                group_id: *group_id,
                status: *status,
                disconnect: false,
                other_members,
            };

            // Someone leaving has no use for the current roster
            if *status {
                plan.send(
                    Target::Origin,
                    ServerEvent::GroupInfoResponse(payload(members.clone())),
                );
            }
            plan.send(
                Target::RoomExceptOrigin(RoomKey::group(class_handle, *group_id)),
                ServerEvent::GroupInfoResponse(payload(vec![requester.clone()])),
            );
        }

        Outcome::PositionUpdated {
            username,
            class_handle,
            group_id,
            info,
            position,
            members,
        } => {
            let event = ServerEvent::CoordinateChangeResponse(CoordinatePayload {
                username: username.clone(),
                class_id: class_handle.clone(),
                group_id: *group_id,
                info: info.clone(),
                position: *position,
                other_members: members.clone(),
            });
            plan.send(Target::Room(RoomKey::group(class_handle, *group_id)), event.clone())
                .send(Target::Room(RoomKey::admin(class_handle)), event);
        }

        Outcome::XmlChanged {
            username,
            class_handle,
            group_id,
            xml,
            toolbar,
        } => {
            let event = ServerEvent::XmlChangeResponse(XmlPayload {
                username: username.clone(),
                class_id: class_handle.clone(),
                group_id: *group_id,
                xml: xml.clone(),
                toolbar: toolbar.clone(),
            });
            plan.send(
                Target::RoomExceptOrigin(RoomKey::group(class_handle, *group_id)),
                event.clone(),
            )
            .send(Target::Room(RoomKey::admin(class_handle)), event);
        }

        Outcome::XmlFetched {
            username,
            class_handle,
            group_id,
            xml,
            toolbar,
        } => {
            plan.send(
                Target::Origin,
                ServerEvent::GetXmlResponse(XmlPayload {
                    username: username.clone(),
                    class_id: class_handle.clone(),
                    group_id: *group_id,
                    xml: xml.clone(),
                    toolbar: toolbar.clone(),
                }),
            );
        }

        Outcome::SettingsFetched {
            class_handle,
            group_id,
            settings,
        } => {
            plan.send(
                Target::Room(RoomKey::group(class_handle, *group_id)),
                ServerEvent::GetSettingsResponse(SettingsPayload {
                    class_id: class_handle.clone(),
                    settings: settings.clone(),
                }),
            );
        }

        Outcome::ClassCreated {
            class_handle,
            class_name,
            group_count,
        } => {
            plan.subscribe(Subscription::Join(RoomKey::admin(class_handle)))
                .send(
                    Target::Origin,
                    ServerEvent::AddClassResponse(ClassPayload {
                        class_id: class_handle.clone(),
                        class_name: class_name.clone(),
                        group_count: *group_count,
                    }),
                );
        }

        Outcome::AdminJoined {
            class_handle,
            class_name,
            group_count,
            group_members,
        } => {
            plan.subscribe(Subscription::Join(RoomKey::admin(class_handle)))
                .send(
                    Target::Origin,
                    ServerEvent::AddClassResponse(ClassPayload {
                        class_id: class_handle.clone(),
                        class_name: class_name.clone(),
                        group_count: *group_count,
                    }),
                );
            for (group_id, members) in group_members {
                plan.send(
                    Target::Room(RoomKey::admin(class_handle)),
                    ServerEvent::GroupInfoResponse(GroupInfoPayload {
                        username: None,
                        class_id: class_handle.clone(),
                        group_id: *group_id,
                        status: true,
                        disconnect: false,
                        other_members: members.clone(),
                    }),
                );
            }
        }

        Outcome::AdminLeft {
            class_handle,
            disconnect,
        } => {
            plan.subscribe(Subscription::Leave(RoomKey::admin(class_handle)))
                .send(
                    Target::Origin,
                    ServerEvent::LeaveClassResponse(ClassClosedPayload {
                        class_id: class_handle.clone(),
                        disconnect: *disconnect,
                    }),
                );
        }

        Outcome::GroupAdded {
            class_handle,
            groups,
        } => {
            let event = ServerEvent::AddGroupResponse(GroupListPayload {
                class_id: class_handle.clone(),
                groups: groups.clone(),
            });
            plan.send(Target::Origin, event.clone())
                .send(Target::Room(RoomKey::class(class_handle)), event);
        }

        Outcome::GroupDeleted {
            class_handle,
            group_id,
            groups,
        } => {
            let event = ServerEvent::DeleteGroupResponse(GroupListPayload {
                class_id: class_handle.clone(),
                groups: groups.clone(),
            });
            let notice = ServerEvent::GroupLeaveResponse(MembershipPayload {
                username: ADMIN_DISPLAY_NAME.to_string(),
                class_id: class_handle.clone(),
                group_id: *group_id,
                status: false,
                disconnect: false,
                group_size: None,
                other_members: Vec::new(),
            });
            plan.send(Target::Origin, event.clone())
                .send(Target::Room(RoomKey::group(class_handle, *group_id)), notice)
                .send(Target::Room(RoomKey::class(class_handle)), event);
            // A later group may reuse the id
            plan.dissolve_rooms
                .push(RoomKey::group(class_handle, *group_id));
        }

        Outcome::ClassDeleted {
            class_handle,
            group_ids,
            disconnect,
        } => {
            let closed = ClassClosedPayload {
                class_id: class_handle.clone(),
                disconnect: *disconnect,
            };
            let logout = ServerEvent::LogoutResponse(LogoutPayload {
                username: None,
                class_id: class_handle.clone(),
                disconnect: *disconnect,
            });

            for group_id in group_ids {
                let room = RoomKey::group(class_handle, *group_id);
                plan.send(
                    Target::Room(room.clone()),
                    ServerEvent::GroupLeaveResponse(MembershipPayload {
                        username: ADMIN_DISPLAY_NAME.to_string(),
                        class_id: class_handle.clone(),
                        group_id: *group_id,
                        status: false,
                        disconnect: *disconnect,
                        group_size: None,
                        other_members: Vec::new(),
                    }),
                )
                .send(Target::Room(room), logout.clone());
            }

            plan.send(
                Target::Room(RoomKey::admin(class_handle)),
                ServerEvent::LeaveClassResponse(closed.clone()),
            )
            .send(
                Target::Room(RoomKey::admin(class_handle)),
                ServerEvent::DeleteClassResponse(closed.clone()),
            )
            .send(Target::Everyone, ServerEvent::DeleteStudentClassResponse(closed))
            .send(Target::Room(RoomKey::class(class_handle)), logout);

            plan.dissolve_class = Some(class_handle.clone());
        }

        Outcome::SettingsSaved {
            class_handle,
            group_ids,
            settings,
        } => {
            let event = ServerEvent::GetSettingsResponse(SettingsPayload {
                class_id: class_handle.clone(),
                settings: settings.clone(),
            });
            for group_id in group_ids {
                plan.send(
                    Target::Room(RoomKey::group(class_handle, *group_id)),
                    event.clone(),
                );
            }
        }

        Outcome::ClassesListed {
            classes,
            disconnect,
        } => {
            plan.send(
                Target::Origin,
                ServerEvent::GetClassesResponse(ClassListPayload {
                    classes: classes.clone(),
                    disconnect: *disconnect,
                }),
            );
        }

        Outcome::ToolbarsListed {
            class_handle,
            toolbars,
        } => {
            let event = ServerEvent::GetToolbarResponse(ToolbarPayload {
                username: ADMIN_DISPLAY_NAME.to_string(),
                class_id: class_handle.clone(),
                toolbars: toolbars.clone(),
            });
            plan.send(Target::Origin, event.clone())
                .send(Target::Room(RoomKey::admin(class_handle)), event);
        }

        Outcome::ToolbarDeleted {
            class_handle,
            toolbars,
        } => {
            plan.send(
                Target::Room(RoomKey::admin(class_handle)),
                ServerEvent::DeleteToolbarResponse(ToolbarPayload {
                    username: ADMIN_DISPLAY_NAME.to_string(),
                    class_id: class_handle.clone(),
                    toolbars: toolbars.clone(),
                }),
            );
        }

        Outcome::AdminCreated {
            username,
            admin_id,
            check,
        } => {
            plan.send(
                Target::Origin,
                ServerEvent::CreateAdminResponse(CheckPayload {
                    username: username.clone(),
                    admin_id: *admin_id,
                    check: *check,
                }),
            );
        }

        Outcome::UsernameChecked { admin_id, check } => {
            plan.send(
                Target::Origin,
                ServerEvent::CheckUsernameResponse(CheckPayload {
                    username: None,
                    admin_id: *admin_id,
                    check: *check,
                }),
            );
        }

        Outcome::SessionChecked { admin_id, check } => {
            plan.send(
                Target::Origin,
                ServerEvent::CheckSessionResponse(CheckPayload {
                    username: None,
                    admin_id: *admin_id,
                    check: *check,
                }),
            );
        }
    }

    plan
}
