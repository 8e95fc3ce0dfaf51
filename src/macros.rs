/// Declare a family node shape
///
/// Generates the node struct together with its [crate::FamilyShape]
/// implementation. An optional leading `name: Entity` slot captures the
/// matching entity itself (an identity slot, always satisfiable); every other
/// slot names a component type the entity must carry and becomes a
/// [crate::Shared] handle populated when the node is built.
///
/// ```
/// use kindred::{family, Component, Entity, EntitySpace, FamilyCache};
///
/// #[derive(Debug)]
/// struct Health { current: i32 }
/// impl Component for Health {}
///
/// family! {
///     struct HealthNode {
///         entity: Entity,
///         health: Health,
///     }
/// }
///
/// let space = EntitySpace::new();
/// let cache: FamilyCache<HealthNode> = space.family();
/// ```
///
/// Shapes whose identity slot isn't first, or with no slots at all, can
/// implement [crate::FamilyShape] by hand instead
#[macro_export]
macro_rules! family {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $entity_slot:ident : Entity,
            $( $slot:ident : $component:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            pub $entity_slot: $crate::Entity,
            $( pub $slot: $crate::Shared<$component>, )*
        }

        impl $crate::FamilyShape for $name {
            fn required_components() -> $crate::ComponentTypeSet {
                let slots: Vec<$crate::ComponentType> =
                    vec![ $( $crate::ComponentType::of::<$component>() ),* ];
                slots.into_iter().collect()
            }

            fn build(entity: &$crate::Entity) -> Option<Self> {
                Some(Self {
                    $entity_slot: entity.clone(),
                    $( $slot: entity.component::<$component>()?, )*
                })
            }
        }
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $slot:ident : $component:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            $( pub $slot: $crate::Shared<$component>, )+
        }

        impl $crate::FamilyShape for $name {
            fn required_components() -> $crate::ComponentTypeSet {
                let slots: Vec<$crate::ComponentType> =
                    vec![ $( $crate::ComponentType::of::<$component>() ),+ ];
                slots.into_iter().collect()
            }

            fn build(entity: &$crate::Entity) -> Option<Self> {
                Some(Self {
                    $( $slot: entity.component::<$component>()?, )+
                })
            }
        }
    };
}
